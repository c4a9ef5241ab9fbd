use std::path::Path;
use std::time::Instant;

use hwtrng_tests::TestResult;

use crate::DeviceArgs;

use super::CliResult;

pub fn run(
    args: &DeviceArgs,
    input: Option<&Path>,
    num_bits: usize,
    output_path: Option<&Path>,
) -> CliResult {
    let t0 = Instant::now();
    let (source, bits) = match input {
        Some(path) => (path.display().to_string(), load_bits(path)?),
        None => {
            let cancel = super::cancel_on_ctrlc();
            let device = super::open_device(args)?;
            let bits = super::with_generator(&device, |d| {
                d.acquire_bits(num_bits, &d.read_limits().with_cancel(cancel))
            })?;
            ("generator".to_string(), bits.as_slice().to_vec())
        }
    };

    println!(
        "Running test battery on {} bits from {source}...\n",
        bits.len()
    );
    let results = hwtrng_tests::run_all_tests(&bits);
    let score = hwtrng_tests::calculate_quality_score(&results);
    let passed = results.iter().filter(|r| r.passed).count();

    println!(
        "  {:<22} {:>4} {:>6} {:>12} {:>12}",
        "Test", "Pass", "Grade", "p-value", "Statistic"
    );
    println!("  {}", "-".repeat(60));
    for r in &results {
        println!(
            "  {:<22} {:>4} {:>6} {:>12} {:>12.4}",
            r.name,
            if r.passed { "yes" } else { "no" },
            r.grade,
            format_p(r.p_value),
            r.statistic
        );
    }
    println!("  {}", "-".repeat(60));
    println!(
        "  Score {score:.1}/100, {passed}/{} passed [{:.1}s]",
        results.len(),
        t0.elapsed().as_secs_f64()
    );

    if let Some(path) = output_path {
        let report = generate_report(&source, bits.len(), &results);
        std::fs::write(path, report)?;
        println!("\nReport saved to: {}", path.display());
    }
    Ok(())
}

/// Bits from an exported file: `.bin` is packed bytes, anything else is
/// `'0'`/`'1'` text.
fn load_bits(path: &Path) -> CliResult<Vec<u8>> {
    let is_bin = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("bin"));
    if is_bin {
        return Ok(hwtrng_tests::bytes_to_bits(&std::fs::read(path)?));
    }
    let text = std::fs::read_to_string(path)?;
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hwtrng_tests::bits_from_str(&compact)?)
}

fn format_p(p: Option<f64>) -> String {
    p.map(|p| format!("{p:.6}")).unwrap_or_else(|| "-".to_string())
}

fn generate_report(source: &str, n_bits: usize, tests: &[TestResult]) -> String {
    let score = hwtrng_tests::calculate_quality_score(tests);
    let passed = tests.iter().filter(|r| r.passed).count();

    let mut report = String::new();
    report.push_str("# hwtrng Randomness Test Report\n\n");
    report.push_str(&format!(
        "Generated: {}\n\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    report.push_str(&format!(
        "- Source: {source}\n- Bits: {n_bits}\n- Score: {score:.1}/100\n- Passed: {passed}/{}\n\n",
        tests.len()
    ));
    report.push_str("| Test | P | Grade | p-value | Statistic | Details |\n");
    report.push_str("|------|---|-------|---------|-----------|---------|\n");
    for t in tests {
        let ok = if t.passed { "✓" } else { "✗" };
        report.push_str(&format!(
            "| {} | {} | {} | {} | {:.4} | {} |\n",
            t.name,
            ok,
            t.grade,
            format_p(t.p_value),
            t.statistic,
            t.details
        ));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_text_and_binary_files() {
        let tmp = tempfile::tempdir().unwrap();

        let txt = tmp.path().join("bits.txt");
        std::fs::write(&txt, "0101\n1100\n").unwrap();
        assert_eq!(load_bits(&txt).unwrap(), vec![0, 1, 0, 1, 1, 1, 0, 0]);

        let bin = tmp.path().join("bits.bin");
        std::fs::write(&bin, [0xF0u8]).unwrap();
        assert_eq!(load_bits(&bin).unwrap(), vec![1, 1, 1, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_load_rejects_non_binary_text() {
        let tmp = tempfile::tempdir().unwrap();
        let txt = tmp.path().join("bad.txt");
        std::fs::write(&txt, "01x").unwrap();
        assert!(load_bits(&txt).is_err());
    }

    #[test]
    fn test_report_lists_every_test() {
        let results = hwtrng_tests::run_all_tests(&[0u8; 1000]);
        let report = generate_report("unit", 1000, &results);
        assert!(report.contains("- Bits: 1000"));
        for r in &results {
            assert!(report.contains(&format!("| {} |", r.name)));
        }
    }
}
