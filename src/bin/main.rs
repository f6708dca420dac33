//! CLI for blockscan

#[cfg(feature = "cli")]
use blockscan::{
    probe, scanner::DirectReader, Error, RangeSpec, ScanEngine, ScanOptions,
};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "blockscan")]
#[command(about = "Block-device health scanner: timed direct reads with latency classification", long_about = None)]
#[command(version)]
struct Cli {
    /// Block device to scan (e.g. /dev/sda, /dev/nvme0n1)
    device: PathBuf,

    /// Start of the range: sector index or percentage (e.g. 0, 1000, 10%)
    start: String,

    /// End of the range: sector index or percentage (e.g. 1000000, 100%)
    end: String,

    /// Read block size in bytes; must be a multiple of the logical block size
    #[arg(short, long, default_value_t = 4096)]
    block_size: usize,

    /// Write a CSV scan log to this file
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Only log reads at or above this latency in ms (0 = log all)
    #[arg(short = 't', long, default_value_t = 0)]
    log_threshold: u64,

    /// Latency taxonomy config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sample this fraction of the range instead of scanning densely (0.0-1.0]
    #[arg(short, long, default_value_t = 1.0)]
    sample: f64,

    /// Randomize sample positions within each stride
    #[arg(short, long)]
    random: bool,

    /// Sleep this percentage of the previous latency before each read
    #[arg(short, long, default_value_t = 0)]
    wait: u32,

    /// Suspect threshold in ms (0 = pick recommended for the device class)
    #[arg(short = 'S', long, default_value_t = 0)]
    suspect: u64,

    /// Retest attempts per suspect sector (3-10)
    #[arg(short = 'R', long, default_value_t = 10)]
    retries: u32,

    /// Pause between retest attempts in ms
    #[arg(short = 'I', long, default_value_t = 100)]
    interval: u64,

    /// Output format for the final report (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,
}

#[cfg(feature = "cli")]
fn main() {
    std::process::exit(run());
}

#[cfg(feature = "cli")]
fn run() -> i32 {
    env_logger::init();
    let cli = Cli::parse();

    let (start, end) = match (cli.start.parse::<RangeSpec>(), cli.end.parse::<RangeSpec>()) {
        (Ok(start), Ok(end)) => (start, end),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("error: {}", e);
            return 2;
        }
    };

    let options = ScanOptions {
        device: cli.device.clone(),
        start,
        end,
        block_size: cli.block_size,
        log_path: cli.log.clone(),
        log_threshold_ms: cli.log_threshold,
        config_path: cli.config.clone(),
        sample_ratio: cli.sample,
        random_sampling: cli.random,
        seed: std::process::id() as u64,
        wait_factor: cli.wait,
        suspect_threshold_ms: cli.suspect,
        retest_attempts: cli.retries,
        retest_interval_ms: cli.interval,
        quiet: false,
    };

    let descriptor = match probe(&cli.device) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            eprintln!("error: {}", e);
            return exit_code_for(&e);
        }
    };
    print_device_info(&descriptor);

    let mut engine = match ScanEngine::new(descriptor, options.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {}", e);
            return 2;
        }
    };
    print_scan_parameters(&engine, &options);

    let logical = engine.descriptor().logical_block_size as u64;
    let mut reader = match DirectReader::open(&cli.device, options.block_size, logical) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("error: {}", e);
            return 3;
        }
    };

    install_signal_handlers();

    let report = match engine.run(&mut reader) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {}", e);
            return 2;
        }
    };

    match cli.format.as_str() {
        "json" => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: cannot serialize report: {}", e);
                return 2;
            }
        },
        _ => print!("{}", report),
    }

    if report.cancelled {
        eprintln!("scan cancelled");
        1
    } else {
        0
    }
}

#[cfg(feature = "cli")]
fn exit_code_for(error: &Error) -> i32 {
    match error {
        Error::NotFound(_) | Error::PermissionDenied(_) | Error::DeviceOpen { .. } => 3,
        _ => 2,
    }
}

#[cfg(feature = "cli")]
fn print_device_info(descriptor: &blockscan::DeviceDescriptor) {
    println!("Device:      {}", descriptor.device_path.display());
    println!("Disk:        {}", descriptor.main_name);
    if descriptor.rotation_rpm > 0 {
        println!("Type:        {} ({} RPM)", descriptor.class, descriptor.rotation_rpm);
    } else {
        println!("Type:        {}", descriptor.class);
    }
    println!("Bus:         {}", descriptor.bus);
    if !descriptor.vendor.is_empty() {
        println!("Vendor:      {}", descriptor.vendor);
    }
    if !descriptor.model.is_empty() {
        println!("Model:       {}", descriptor.model);
    }
    if !descriptor.serial.is_empty() {
        println!("Serial:      {}", descriptor.serial);
    }
    if !descriptor.firmware.is_empty() {
        println!("Firmware:    {}", descriptor.firmware);
    }
    match &descriptor.nominal_capacity_str {
        Some(nominal) => println!(
            "Capacity:    {:.2} GB (labelled {})",
            descriptor.capacity_gb(),
            nominal
        ),
        None => println!("Capacity:    {:.2} GB", descriptor.capacity_gb()),
    }
    println!(
        "Geometry:    {} sectors x 512 B, logical {} B, physical {} B, optimal I/O {} B",
        descriptor.total_sectors_512,
        descriptor.logical_block_size,
        descriptor.physical_block_size,
        descriptor.optimal_io_size
    );
    println!("Probe depth: {}", descriptor.completeness);
    println!();
}

#[cfg(feature = "cli")]
fn print_scan_parameters(engine: &ScanEngine, options: &ScanOptions) {
    let schedule = engine.schedule();
    println!(
        "Scanning sectors {} to {} ({} samples planned, {} B reads)",
        schedule.start_sector(),
        schedule.end_sector(),
        schedule.planned_count(),
        options.block_size
    );
    if options.sample_ratio < 1.0 {
        println!(
            "Sampling:    {:.2}% ({})",
            options.sample_ratio * 100.0,
            if options.random_sampling {
                "randomized within stride"
            } else {
                "uniform stride"
            }
        );
    }
    println!(
        "Suspect:     >= {} ms, {} retest attempts, {} ms apart",
        engine.taxonomy().suspect_threshold,
        options.retest_attempts,
        options.retest_interval_ms
    );
    if options.wait_factor > 0 {
        println!("Pacing:      {}% of previous latency", options.wait_factor);
    }
    if let Some(log) = &options.log_path {
        println!("Log:         {}", log.display());
    }
    println!();
}

/// Route SIGINT/SIGTERM to the engine's cancellation flag. The handler
/// only stores an atomic, which is async-signal-safe.
#[cfg(all(feature = "cli", unix))]
fn install_signal_handlers() {
    extern "C" fn handle_signal(_: libc::c_int) {
        blockscan::request_cancel();
    }
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }
}

#[cfg(all(feature = "cli", not(unix)))]
fn install_signal_handlers() {}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
