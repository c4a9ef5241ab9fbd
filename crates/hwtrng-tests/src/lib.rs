//! NIST SP 800-22 inspired randomness test battery for bit strings.
//!
//! Provides 9 statistical tests for validating the raw bitstream of a hardware
//! generator. Every test consumes a bit slice (one `u8` per bit, values 0/1)
//! and returns a [`TestResult`] with the statistic, a p-value where one is
//! defined, a pass/fail determination and a letter grade (A through F).
//! Inputs a test cannot evaluate are rejected with an [`InputError`].
//!
//! Approximation only: this is not a certification suite.

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use statrs::function::erf::erfc;

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a single randomness test.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub p_value: Option<f64>,
    pub statistic: f64,
    pub details: String,
    pub grade: char,
}

impl TestResult {
    /// Assign a letter grade based on p-value.
    ///
    /// - A: p >= 0.1
    /// - B: p >= 0.01
    /// - C: p >= 0.001
    /// - D: p >= 0.0001
    /// - F: otherwise or None
    pub fn grade_from_p(p: Option<f64>) -> char {
        match p {
            Some(p) if p >= 0.1 => 'A',
            Some(p) if p >= 0.01 => 'B',
            Some(p) if p >= 0.001 => 'C',
            Some(p) if p >= 0.0001 => 'D',
            _ => 'F',
        }
    }

    /// Pass when `p >= threshold`.
    pub fn pass_from_p(p: Option<f64>, threshold: f64) -> bool {
        match p {
            Some(p) => p >= threshold,
            None => false,
        }
    }

    /// Pass when `p > threshold`.
    pub fn pass_above_p(p: Option<f64>, threshold: f64) -> bool {
        match p {
            Some(p) => p > threshold,
            None => false,
        }
    }

    fn new(name: &str, passed: bool, p_value: Option<f64>, statistic: f64, details: String) -> Self {
        // A failing test never earns a passing grade.
        let grade = match TestResult::grade_from_p(p_value) {
            'A' | 'B' if !passed => 'C',
            g => g,
        };
        TestResult {
            name: name.to_string(),
            passed,
            p_value,
            statistic,
            details,
            grade,
        }
    }
}

/// Input a test cannot evaluate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("empty bit string")]
    Empty,
    #[error("insufficient data: need {needed} bits, got {got}")]
    TooShort { needed: usize, got: usize },
    #[error("non-binary value {value} at position {index}")]
    NotBinary { index: usize, value: u8 },
    #[error("invalid parameter: {0}")]
    Parameter(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Thresholds
// ═══════════════════════════════════════════════════════════════════════════════

/// Significance level for the p-value based tests.
pub const ALPHA: f64 = 0.01;
/// Two-sided 95% normal bound used by frequency and autocorrelation.
pub const Z_CRITICAL: f64 = 1.96;
/// Poker test acceptance bound on χ².
pub const POKER_CRITICAL: f64 = 9.49;
/// Serial test acceptance bound on χ².
pub const SERIAL_CRITICAL: f64 = 9.21;

pub const POKER_BLOCK: usize = 4;
pub const SERIAL_BLOCK: usize = 2;
pub const AUTOCORRELATION_LAG: usize = 1;
pub const APEN_BLOCK: usize = 10;
pub const LONGEST_RUN_BLOCK: usize = 128;
pub const BLOCK_FREQUENCY_BLOCK: usize = 100;

/// Longest-run classes for M=128: <=4, 5, 6, 7, 8, >=9.
const LONGEST_RUN_PROBS: [f64; 6] = [0.1174, 0.2430, 0.2493, 0.1752, 0.1027, 0.1124];
const LONGEST_RUN_DOF: f64 = 6.0;

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Unpack a byte slice into individual bits (MSB first per byte).
pub fn bytes_to_bits(data: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(data.len() * 8);
    for &byte in data {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1);
        }
    }
    bits
}

/// Parse `'0'`/`'1'` text into bits.
pub fn bits_from_str(text: &str) -> Result<Vec<u8>, InputError> {
    text.bytes()
        .enumerate()
        .map(|(index, c)| match c {
            b'0' => Ok(0),
            b'1' => Ok(1),
            value => Err(InputError::NotBinary { index, value }),
        })
        .collect()
}

/// Reject empty, non-binary or too-short input. Returns `n`.
fn check(bits: &[u8], needed: usize) -> Result<usize, InputError> {
    if bits.is_empty() {
        return Err(InputError::Empty);
    }
    if let Some((index, &value)) = bits.iter().enumerate().find(|&(_, &b)| b > 1) {
        return Err(InputError::NotBinary { index, value });
    }
    if bits.len() < needed {
        return Err(InputError::TooShort {
            needed,
            got: bits.len(),
        });
    }
    Ok(bits.len())
}

fn ones(bits: &[u8]) -> usize {
    bits.iter().map(|&b| b as usize).sum()
}

/// Upper tail of χ² with `df` degrees of freedom.
fn chi2_sf(df: f64, x: f64) -> f64 {
    ChiSquared::new(df).map(|d| d.sf(x.max(0.0))).unwrap_or(0.0)
}

fn normal_cdf(x: f64) -> f64 {
    Normal::standard().cdf(x)
}

/// Two-sided normal p-value for |z|.
fn two_sided_p(z: f64) -> f64 {
    erfc(z.abs() / 2.0_f64.sqrt())
}

/// Pearson χ² of observed counts against a uniform expectation.
fn uniform_chi2(counts: &[u64], total: usize) -> f64 {
    let expected = total as f64 / counts.len() as f64;
    counts
        .iter()
        .map(|&c| {
            let diff = c as f64 - expected;
            diff * diff / expected
        })
        .sum()
}

// ═══════════════════════════════════════════════════════════════════════════════
// 1. FREQUENCY TESTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Frequency (monobit): |ones - n/2| / sqrt(n) must stay within 1.96.
pub fn frequency_test(bits: &[u8]) -> Result<TestResult, InputError> {
    let name = "Frequency";
    let n = check(bits, 1)?;
    let ones = ones(bits);
    let statistic = (ones as f64 - n as f64 / 2.0).abs() / (n as f64).sqrt();
    // Same statistic as NIST s_obs / 2.
    let p = erfc(2.0 * statistic / 2.0_f64.sqrt());
    Ok(TestResult::new(
        name,
        statistic <= Z_CRITICAL,
        Some(p),
        statistic,
        format!("ones={ones}, n={n}"),
    ))
}

/// Block frequency: proportion of ones within M-bit blocks. Chi-squared test.
pub fn block_frequency_test(bits: &[u8], block_size: usize) -> Result<TestResult, InputError> {
    let name = "Block Frequency";
    if block_size == 0 {
        return Err(InputError::Parameter("block size must be positive".into()));
    }
    let n = check(bits, block_size)?;
    let num_blocks = n / block_size;
    let mut chi2 = 0.0;
    for block in bits.chunks_exact(block_size) {
        let proportion = ones(block) as f64 / block_size as f64;
        chi2 += (proportion - 0.5) * (proportion - 0.5);
    }
    chi2 *= 4.0 * block_size as f64;
    let p = chi2_sf(num_blocks as f64, chi2);
    Ok(TestResult::new(
        name,
        TestResult::pass_above_p(Some(p), ALPHA),
        Some(p),
        chi2,
        format!("blocks={num_blocks}, M={block_size}"),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// 2. RUNS TESTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs: number of uninterrupted runs of identical bits.
pub fn runs_test(bits: &[u8]) -> Result<TestResult, InputError> {
    let name = "Runs";
    let n = check(bits, 2)?;
    let nf = n as f64;
    let prop = ones(bits) as f64 / nf;
    let tau = 2.0 / nf.sqrt();
    if (prop - 0.5).abs() >= tau {
        return Ok(TestResult::new(
            name,
            false,
            Some(0.0),
            0.0,
            format!("Pre-test failed: proportion={prop:.4}, tau={tau:.4}"),
        ));
    }
    let runs = 1 + bits.windows(2).filter(|w| w[0] != w[1]).count();
    let expected = 2.0 * nf * prop * (1.0 - prop);
    let std = 2.0 * nf.sqrt() * prop * (1.0 - prop);
    let z = (runs as f64 - expected).abs() / std;
    let p = 2.0 * (1.0 - normal_cdf(z));
    Ok(TestResult::new(
        name,
        TestResult::pass_from_p(Some(p), ALPHA),
        Some(p),
        z,
        format!("runs={runs}, expected={expected:.0}"),
    ))
}

/// Longest run of ones within 128-bit blocks, chi-squared against the
/// reference class probabilities.
pub fn longest_run_test(bits: &[u8]) -> Result<TestResult, InputError> {
    let name = "Longest Run of Ones";
    let n = check(bits, LONGEST_RUN_BLOCK)?;
    let num_blocks = n / LONGEST_RUN_BLOCK;

    let mut observed = [0u64; 6];
    for block in bits.chunks_exact(LONGEST_RUN_BLOCK) {
        let mut max_run = 0usize;
        let mut current_run = 0usize;
        for &bit in block {
            if bit == 1 {
                current_run += 1;
                max_run = max_run.max(current_run);
            } else {
                current_run = 0;
            }
        }
        let class = max_run.clamp(4, 9) - 4;
        observed[class] += 1;
    }

    let mut chi2 = 0.0;
    for (count, prob) in observed.iter().zip(LONGEST_RUN_PROBS) {
        let expected = prob * num_blocks as f64;
        let diff = *count as f64 - expected;
        chi2 += diff * diff / expected;
    }
    let p = chi2_sf(LONGEST_RUN_DOF, chi2);
    Ok(TestResult::new(
        name,
        TestResult::pass_above_p(Some(p), ALPHA),
        Some(p),
        chi2,
        format!("blocks={num_blocks}, M={LONGEST_RUN_BLOCK}, classes={observed:?}"),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// 3. PATTERN TESTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Poker: frequency of non-overlapping 4-bit blocks over all 16 buckets.
pub fn poker_test(bits: &[u8]) -> Result<TestResult, InputError> {
    let name = "Poker";
    let m = POKER_BLOCK;
    let n = check(bits, m)?;
    let num_blocks = n / m;
    let mut counts = vec![0u64; 1 << m];
    for block in bits.chunks_exact(m) {
        let value = block.iter().fold(0usize, |acc, &b| (acc << 1) | b as usize);
        counts[value] += 1;
    }
    let chi2 = uniform_chi2(&counts, num_blocks);
    let p = chi2_sf(((1 << m) - 1) as f64, chi2);
    Ok(TestResult::new(
        name,
        chi2 <= POKER_CRITICAL,
        Some(p),
        chi2,
        format!("blocks={num_blocks}, m={m}"),
    ))
}

/// Serial: frequency of overlapping 2-bit windows.
pub fn serial_test(bits: &[u8]) -> Result<TestResult, InputError> {
    let name = "Serial";
    let m = SERIAL_BLOCK;
    let n = check(bits, m)?;
    let windows = n - m + 1;
    let mut counts = vec![0u64; 1 << m];
    for window in bits.windows(m) {
        let value = window.iter().fold(0usize, |acc, &b| (acc << 1) | b as usize);
        counts[value] += 1;
    }
    let chi2 = uniform_chi2(&counts, windows);
    let p = chi2_sf(((1 << m) - 1) as f64, chi2);
    Ok(TestResult::new(
        name,
        chi2 <= SERIAL_CRITICAL,
        Some(p),
        chi2,
        format!("windows={windows}, counts={counts:?}"),
    ))
}

/// Approximate entropy: compare m and m+1 bit pattern frequencies.
pub fn approximate_entropy_test(bits: &[u8], m: usize) -> Result<TestResult, InputError> {
    let name = "Approximate Entropy";
    if m == 0 || m > 20 {
        return Err(InputError::Parameter(format!("block length {m} outside 1..=20")));
    }
    let n = check(bits, m + 1)?;

    // Circular pattern counts, as in SP 800-22.
    let phi = |block_len: usize| -> f64 {
        let mut counts = vec![0u64; 1 << block_len];
        for i in 0..n {
            let mut val = 0usize;
            for j in 0..block_len {
                val = (val << 1) | bits[(i + j) % n] as usize;
            }
            counts[val] += 1;
        }
        counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / n as f64;
                p * p.ln()
            })
            .sum()
    };

    let apen = phi(m) - phi(m + 1);
    let chi2 = 2.0 * n as f64 * (std::f64::consts::LN_2 - apen);
    // igamc(2^(m-1), chi2/2) is the χ² upper tail with 2^m degrees of freedom.
    let p = chi2_sf((1u64 << m) as f64, chi2);
    Ok(TestResult::new(
        name,
        TestResult::pass_above_p(Some(p), ALPHA),
        Some(p),
        chi2,
        format!("ApEn={apen:.6}, m={m}"),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// 4. RANDOM WALK AND CORRELATION TESTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Cumulative sums (forward): maximal excursion of the ±1 random walk.
pub fn cumulative_sums_test(bits: &[u8]) -> Result<TestResult, InputError> {
    let name = "Cumulative Sums";
    let n = check(bits, 1)?;

    let mut s: i64 = 0;
    let mut z: u64 = 0;
    for &bit in bits {
        s += if bit == 1 { 1 } else { -1 };
        z = z.max(s.unsigned_abs());
    }

    let nf = n as f64;
    let zf = z as f64;
    let sqrt_n = nf.sqrt();
    let term = |k: i64, a: f64, b: f64| {
        let kf = k as f64;
        normal_cdf((4.0 * kf + a) * zf / sqrt_n) - normal_cdf((4.0 * kf + b) * zf / sqrt_n)
    };
    let k_end = ((nf / zf - 1.0) / 4.0).trunc() as i64;

    let sum1: f64 = ((((-nf / zf) + 1.0) / 4.0).trunc() as i64..=k_end)
        .map(|k| term(k, 1.0, -1.0))
        .sum();
    let sum2: f64 = ((((-nf / zf) - 3.0) / 4.0).trunc() as i64..=k_end)
        .map(|k| term(k, 3.0, 1.0))
        .sum();
    let p = (1.0 - sum1 + sum2).clamp(0.0, 1.0);
    Ok(TestResult::new(
        name,
        TestResult::pass_from_p(Some(p), ALPHA),
        Some(p),
        zf,
        format!("max|S|={z}, n={n}"),
    ))
}

/// Autocorrelation at lag `d`: normalized covariance of the ±1 sequence with
/// its shifted copy.
pub fn autocorrelation_test(bits: &[u8], lag: usize) -> Result<TestResult, InputError> {
    let name = "Autocorrelation";
    if lag == 0 {
        return Err(InputError::Parameter("lag must be positive".into()));
    }
    let n = check(bits, lag + 1)?;
    let pairs = n - lag;
    let sum: i64 = bits
        .iter()
        .zip(&bits[lag..])
        .map(|(&a, &b)| if a == b { 1 } else { -1 })
        .sum();
    let z = sum as f64 / (pairs as f64).sqrt();
    let p = two_sided_p(z);
    Ok(TestResult::new(
        name,
        z.abs() <= Z_CRITICAL,
        Some(p),
        z,
        format!("lag={lag}, covariance_sum={sum}, pairs={pairs}"),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Test battery
// ═══════════════════════════════════════════════════════════════════════════════

/// Failing result for a test that rejected its input.
fn rejected(name: &str, err: &InputError) -> TestResult {
    TestResult {
        name: name.to_string(),
        passed: false,
        p_value: None,
        statistic: 0.0,
        details: match err {
            InputError::TooShort { .. } | InputError::Empty => format!("Insufficient data: {err}"),
            other => other.to_string(),
        },
        grade: 'F',
    }
}

type BatteryTest = (&'static str, fn(&[u8]) -> Result<TestResult, InputError>);

fn autocorrelation_default(bits: &[u8]) -> Result<TestResult, InputError> {
    autocorrelation_test(bits, AUTOCORRELATION_LAG)
}

fn approximate_entropy_default(bits: &[u8]) -> Result<TestResult, InputError> {
    approximate_entropy_test(bits, APEN_BLOCK)
}

fn block_frequency_default(bits: &[u8]) -> Result<TestResult, InputError> {
    block_frequency_test(bits, BLOCK_FREQUENCY_BLOCK)
}

/// Run the complete 9-test battery with default parameters.
pub fn run_all_tests(bits: &[u8]) -> Vec<TestResult> {
    let tests: [BatteryTest; 9] = [
        ("Frequency", frequency_test),
        ("Runs", runs_test),
        ("Poker", poker_test),
        ("Serial", serial_test),
        ("Cumulative Sums", cumulative_sums_test),
        ("Autocorrelation", autocorrelation_default),
        ("Approximate Entropy", approximate_entropy_default),
        ("Longest Run of Ones", longest_run_test),
        ("Block Frequency", block_frequency_default),
    ];

    tests
        .iter()
        .map(|(name, test_fn)| test_fn(bits).unwrap_or_else(|e| rejected(name, &e)))
        .collect()
}

/// Calculate overall quality score (0-100) from test results.
///
/// Each grade maps to a score: A=100, B=75, C=50, D=25, F=0.
/// Returns the average across all tests.
pub fn calculate_quality_score(results: &[TestResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: f64 = results
        .iter()
        .map(|r| match r.grade {
            'A' => 100.0,
            'B' => 75.0,
            'C' => 50.0,
            'D' => 25.0,
            _ => 0.0,
        })
        .sum();
    total / results.len() as f64
}
