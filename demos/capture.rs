use clap::{Parser, Subcommand};
use ja4plus::{FingerprintOutput, Ja4PlusAnalyzer, Ja4PlusConfig};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Log file path
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<String>,

    /// Skip the unhashed JA4S_r and JA4X_r values
    #[arg(long = "no-raw")]
    no_raw: bool,

    /// SSH packets per JA4SSH window
    #[arg(long = "ssh-window", default_value_t = 200)]
    ssh_window: usize,

    /// Seconds of inactivity after which a flow is forgotten
    #[arg(long = "flow-timeout", default_value_t = 300)]
    flow_timeout: u64,

    /// Worker threads; 0 processes frames on the capture thread
    #[arg(short = 'w', long, default_value_t = 0)]
    workers: usize,

    /// Frames queued per worker
    #[arg(long = "queue-size", default_value_t = 1000)]
    queue_size: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Live {
        /// Network interface name
        #[arg(short = 'i', long)]
        interface: String,
    },
    Pcap {
        /// PCAP file path
        #[arg(short = 'f', long)]
        file: String,
    },
}

fn initialize_logging(log_file: Option<String>) {
    let console_writer = std::io::stdout.with_max_level(tracing::Level::INFO);
    let file_appender =
        RollingFileAppender::new(Rotation::NEVER, ".", log_file.as_deref().unwrap_or("ja4plus.log"))
            .with_max_level(tracing::Level::INFO);

    let subscriber = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(console_writer.and(file_appender))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {e}");
        std::process::exit(1);
    }
}

fn main() {
    let args = Args::parse();
    initialize_logging(args.log_file.clone());

    info!("Starting JA4+ capture");

    let config = Ja4PlusConfig {
        raw: !args.no_raw,
        ssh_window: args.ssh_window,
        flow_timeout: Duration::from_secs(args.flow_timeout),
        ..Ja4PlusConfig::default()
    };

    let analyzer = if args.workers > 0 {
        Ja4PlusAnalyzer::with_workers(config, args.workers, args.queue_size)
    } else {
        Ja4PlusAnalyzer::new(config)
    };
    let mut analyzer = match analyzer {
        Ok(analyzer) => analyzer,
        Err(e) => {
            error!("Invalid configuration: {e}");
            return;
        }
    };

    let (sender, receiver): (Sender<FingerprintOutput>, Receiver<FingerprintOutput>) =
        mpsc::channel();
    let cancel_signal = Arc::new(AtomicBool::new(false));
    let thread_cancel_signal = cancel_signal.clone();

    let capture = thread::spawn(move || {
        let result = match args.command {
            Commands::Live { interface } => {
                info!("Starting live capture on interface: {}", interface);
                analyzer.analyze_network(&interface, sender, Some(thread_cancel_signal))
            }
            Commands::Pcap { file } => {
                info!("Analyzing PCAP file: {}", file);
                analyzer.analyze_pcap(&file, sender, Some(thread_cancel_signal))
            }
        };

        if let Err(e) = result {
            error!("JA4+ analysis failed: {e}");
        }
    });

    for output in receiver {
        info!("{}", output);
    }

    if capture.join().is_err() {
        error!("Capture thread panicked");
    }
    info!("Analysis completed");
}
