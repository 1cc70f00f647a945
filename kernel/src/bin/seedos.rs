//! SeedOS Command-Line Front End
//!
//! Drives the simulator from the host:
//! - Format and inspect a disk image
//! - Create, list, and remove files and directories
//! - Copy host files into the simulated disk and read them back
//! - Run the canonical scheduler demo and print its dispatch trace

use clap::{Parser, Subcommand};
use seedos_fs::{FileSystem, ImageDisk, SectorIo, NUM_SECTORS};
use seedos_kernel::{Kernel, SchedPolicy, TraceSwitch};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "seedos")]
#[command(author = "SeedOS Contributors")]
#[command(version)]
#[command(about = "SeedOS teaching kernel simulator")]
struct Cli {
    /// Disk image path
    #[arg(short, long, value_name = "FILE", default_value = "seedos.disk")]
    disk: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a fresh, formatted disk image
    Format,
    /// Create an empty file of a fixed size
    Create {
        path: String,
        /// File size in bytes
        size: usize,
    },
    /// Create a directory
    Mkdir { path: String },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Descend into sub-directories
        #[arg(short, long)]
        recursive: bool,
    },
    /// Remove a file or (recursively) a directory
    Rm {
        path: String,
        /// Remove directories and their contents
        #[arg(short, long)]
        recursive: bool,
    },
    /// Copy a host file into the simulated disk
    Copyin {
        host_path: PathBuf,
        path: String,
    },
    /// Print a file's contents
    Cat { path: String },
    /// Run the three-thread scheduling demo
    SchedDemo {
        /// Scheduler policy file (JSON); defaults apply when omitted
        #[arg(short, long, value_name = "FILE")]
        policy: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match &cli.command {
        Commands::Format => format_disk(&cli.disk),
        Commands::SchedDemo { policy } => sched_demo(policy.as_deref()),
        command => with_file_system(&cli.disk, command),
    };

    if let Err(e) = result {
        eprintln!("seedos: {e}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn format_disk(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let disk: Arc<dyn SectorIo> = Arc::new(ImageDisk::create(path, NUM_SECTORS)?);
    FileSystem::new(disk, true)?;
    println!("formatted {} ({} sectors)", path.display(), NUM_SECTORS);
    Ok(())
}

fn with_file_system(
    path: &PathBuf,
    command: &Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    let disk: Arc<dyn SectorIo> = Arc::new(ImageDisk::open(path)?);
    let mut fs = FileSystem::new(disk, false)?;

    match command {
        Commands::Create { path, size } => {
            fs.create(path, *size)?;
            println!("created {path} ({size} bytes)");
        }
        Commands::Mkdir { path } => {
            fs.create_directory(path)?;
            println!("created directory {path}");
        }
        Commands::Ls { path, recursive } => {
            print!("{}", fs.list(path, *recursive)?);
        }
        Commands::Rm { path, recursive } => {
            fs.remove(path, *recursive)?;
            println!("removed {path}");
        }
        Commands::Copyin { host_path, path } => {
            let contents = std::fs::read(host_path)?;
            fs.create(path, contents.len())?;
            let mut file = fs.open(path)?;
            let written = file.write_at(&contents, 0)?;
            println!("copied {} -> {path} ({written} bytes)", host_path.display());
        }
        Commands::Cat { path } => {
            let mut file = fs.open(path)?;
            let mut contents = vec![0u8; file.length()];
            file.read_at(&mut contents, 0)?;
            print!("{}", String::from_utf8_lossy(&contents));
        }
        Commands::Format | Commands::SchedDemo { .. } => unreachable!("handled by the caller"),
    }
    Ok(())
}

/// Spawn three threads across the three queue bands, let each run a burst
/// and finish, and print the dispatch order the machine recorded.
fn sched_demo(policy_file: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    let policy = match policy_file {
        Some(path) => SchedPolicy::load(path)?,
        None => SchedPolicy::default(),
    };
    let (switch, log) = TraceSwitch::new();
    let mut kernel = Kernel::new(policy, Box::new(switch));

    let t1 = kernel.spawn_thread("t1", 40, 10);
    let t2 = kernel.spawn_thread("t2", 60, 10);
    let t3 = kernel.spawn_thread("t3", 120, 10);
    for id in [t1, t2, t3] {
        kernel.ready_to_run(id);
    }
    println!("spawned t1 (priority 40), t2 (priority 60), t3 (priority 120)");

    // Each pass hands the CPU over, burns a burst, and finishes the thread;
    // queue rank dictates the order: L1 (t3), then L2 (t2), then L3.
    for _ in 0..3 {
        kernel.yield_now();
        kernel.advance_time(30);
        kernel.finish_current();
    }

    println!("dispatch trace (old -> next):");
    for (old, next) in log.lock().expect("trace log poisoned").iter() {
        println!("  thread {} -> thread {}", old.value(), next.value());
    }
    println!("ticks elapsed: {}", kernel.timer().ticks());
    Ok(())
}
