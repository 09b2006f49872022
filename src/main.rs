//! RMI4 touchpad driver
//!
//! Main entry point: device listing, capability probing and the run loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use rmi4_device::{Capabilities, InputEvent, InputSink, Rmi4Device};
use rmi4_transport::{HidRawTransport, PagedTransport, ReaderConfig, ReportReader, TransportError};
use rmi_driver::config::DriverConfig;
use rmi_driver::discovery::{list_devices, open_device, select_device};
use rmi_driver::uinput::UinputSink;

#[derive(Parser)]
#[command(name = "rmi-driver")]
#[command(about = "Userspace driver for RMI4 touchpads tunneled over HID")]
struct Cli {
    /// Config file path (default: ~/.config/rmi-driver/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// hidraw device path (default: first supported device)
    #[arg(short, long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List supported devices
    List,
    /// Probe a device and print its capabilities
    Info,
    /// Drive the touchpad until interrupted
    Run {
        /// Print decoded events instead of creating a uinput device
        #[arg(long)]
        print: bool,
    },
    /// Write the current configuration to the config file
    InitConfig,
}

/// Sink printing every event to stdout
struct PrintSink;

impl InputSink for PrintSink {
    fn emit(&self, event: InputEvent) {
        match event {
            InputEvent::Contact {
                slot,
                contact: Some(c),
            } => println!(
                "slot {}: x={} y={} p={} major={} minor={} orient={}",
                slot, c.x, c.y, c.pressure, c.touch_major, c.touch_minor, c.orientation
            ),
            InputEvent::Contact {
                slot,
                contact: None,
            } => println!("slot {}: up", slot),
            InputEvent::Button { index, pressed } => println!(
                "button {}: {}",
                index,
                if pressed { "down" } else { "up" }
            ),
            InputEvent::Sync => println!("---"),
        }
    }
}

/// An opened touchpad with its report reader running
struct Session {
    hid: Arc<HidRawTransport>,
    device: Arc<Rmi4Device>,
    reader: ReportReader,
}

impl Session {
    fn open(config: &DriverConfig, path: Option<&str>, sink: Arc<dyn InputSink>) -> Result<Self> {
        let info = select_device(config, path)?;
        let (hid, input) = open_device(&info)?;
        let hid = Arc::new(hid);

        let transport = Arc::new(
            PagedTransport::new(hid.clone(), config.report_sizes())
                .with_read_policy(config.read_policy()),
        );
        let device = Arc::new(Rmi4Device::new(transport, sink));

        let reader_device = Arc::clone(&device);
        let reader_config = ReaderConfig {
            buffer_size: config.input_report_size.max(ReaderConfig::default().buffer_size),
            ..Default::default()
        };
        let reader = ReportReader::spawn(input, reader_config, move |report| {
            reader_device.on_report(report);
        })?;

        Ok(Self {
            hid,
            device,
            reader,
        })
    }

    fn close(mut self) {
        self.device.shutdown();
        self.reader.stop();
    }
}

fn setup_interrupt_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .ok();

    running
}

fn print_capabilities(caps: &Capabilities) {
    println!("Fingers:     {}", caps.max_fingers);
    println!("Range:       {} x {}", caps.max_x, caps.max_y);
    match (caps.x_size_mm, caps.y_size_mm) {
        (Some(w), Some(h)) => println!("Size:        {} x {} mm", w, h),
        _ => println!("Size:        unknown"),
    }
    if let Some((rx, ry)) = caps.resolution {
        println!("Resolution:  {} x {} units/mm", rx, ry);
    }
    println!(
        "Buttons:     {}{}",
        caps.button_count,
        if caps.is_buttonpad { " (clickpad)" } else { "" }
    );
}

fn cmd_list(config: &DriverConfig) -> Result<()> {
    let devices = list_devices(config)?;
    if devices.is_empty() {
        println!("No supported devices found");
        return Ok(());
    }
    for d in devices {
        println!(
            "{}  {:04x}:{:04x}  {}",
            d.device_path,
            d.vid,
            d.pid,
            d.product_name.as_deref().unwrap_or("Unknown")
        );
    }
    Ok(())
}

fn cmd_info(config: &DriverConfig, path: Option<&str>) -> Result<()> {
    let session = Session::open(config, path, Arc::new(PrintSink))?;
    let result = session.device.initialize();
    session.close();
    print_capabilities(&result?);
    Ok(())
}

fn cmd_run(config: &DriverConfig, path: Option<&str>, print: bool) -> Result<()> {
    let running = setup_interrupt_handler();

    let uinput = Arc::new(UinputSink::new());
    let sink: Arc<dyn InputSink> = if print {
        Arc::new(PrintSink)
    } else {
        uinput.clone()
    };
    let session = Session::open(config, path, sink)?;

    let caps = match session.device.initialize() {
        Ok(caps) => caps,
        Err(e) => {
            error!("Initialization failed: {}", e);
            session.close();
            return Err(e.into());
        }
    };
    info!(
        "Touchpad ready: {} fingers, {}x{}, {} buttons",
        caps.max_fingers, caps.max_x, caps.max_y, caps.button_count
    );

    if !print {
        if let Err(e) = uinput.create(&config.device_name, &caps) {
            session.close();
            return Err(e.into());
        }
        info!("Created virtual touchpad: {}", config.device_name);
    }

    let mut ticks = 0u32;
    let mut result = Ok(());
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
        ticks = ticks.wrapping_add(1);
        if ticks % 10 == 0 && !session.hid.is_connected() {
            error!("Touchpad disconnected");
            result = Err(TransportError::Disconnected.into());
            break;
        }
    }

    info!("Shutting down");
    session.close();
    result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load config
    let config_path = cli.config.unwrap_or_else(DriverConfig::default_path);
    info!("Loading config from {:?}", config_path);
    let config = DriverConfig::load(&config_path)?;
    let device = cli.device.as_deref();

    match cli.command {
        Command::List => cmd_list(&config),
        Command::Info => cmd_info(&config, device),
        Command::Run { print } => cmd_run(&config, device, print),
        Command::InitConfig => {
            config.save(&config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
    }
}
