//! CLI for hwtrng: boot a serial TRNG, serve it over HTTP, test its output.

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hwtrng")]
#[command(about = "hwtrng: drive a serial hardware random number generator")]
#[command(version = hwtrng_core::VERSION)]
struct Cli {
    #[command(flatten)]
    device: DeviceArgs,

    #[command(subcommand)]
    command: Commands,
}

/// How to reach the generator. Flags override `PORT` / `BAUD_RATE`.
#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Serial port of the generator, e.g. /dev/ttyUSB0 or COM3
    #[arg(long, global = true)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, global = true)]
    baud_rate: Option<u32>,

    /// Use the built-in simulated generator instead of a serial device
    #[arg(long, global = true)]
    simulate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (/trng/randomNum/...)
    Server {
        /// Address to bind
        #[arg(long, env = "HWTRNG_HOST", default_value = "127.0.0.1")]
        host: String,

        /// HTTP port
        #[arg(long, env = "HWTRNG_HTTP_PORT", default_value = "5000")]
        http_port: u16,

        /// Directory for generated test data files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Print random numbers as uppercase hex
    Generate {
        /// Bits per number
        #[arg(long, default_value = "32")]
        num_bits: usize,

        /// How many numbers
        #[arg(long, default_value = "1")]
        quantity: usize,

        /// Print a JSON array instead of one number per line
        #[arg(long)]
        json: bool,
    },

    /// Write raw generator bits to a timestamped test data file
    Export {
        /// Number of bits
        #[arg(long, default_value = "5000")]
        num_bits: usize,

        /// File type
        #[arg(long, default_value = "bin", value_parser = ["txt", "bin"])]
        filetype: String,

        /// Directory to write into
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Run the 9-test randomness battery on fresh bits or an exported file
    Report {
        /// Test this .txt/.bin file instead of reading the generator
        #[arg(long)]
        input: Option<PathBuf>,

        /// Bits to acquire from the generator
        #[arg(long, default_value = "20000")]
        num_bits: usize,

        /// Write a Markdown report to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Server {
            host,
            http_port,
            output_dir,
        } => commands::server::run(&cli.device, &host, http_port, output_dir),
        Commands::Generate {
            num_bits,
            quantity,
            json,
        } => commands::generate::run(&cli.device, num_bits, quantity, json),
        Commands::Export {
            num_bits,
            filetype,
            output_dir,
        } => commands::export::run(&cli.device, num_bits, &filetype, &output_dir),
        Commands::Report {
            input,
            num_bits,
            output,
        } => commands::report::run(&cli.device, input.as_deref(), num_bits, output.as_deref()),
    };

    if let Err(e) = outcome {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
