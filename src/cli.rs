//! Command handlers for the librarian binary

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::*;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::config::LibrarianConfig;
use crate::device::{Device, DeviceSession, ModuleCategory, Occupancy, SlotStatus};
use crate::preset::{self, PresetFile};
use crate::session::Session;
use crate::transport::midi_port::discovery;
use crate::transport::{MidiPortTransport, Transport};

/// Port name fragments tried when listing ports
const DEVICE_PATTERNS: &[&str] = &["NTS-1 digital kit mkII", "NTS-1 digital kit", "NTS-1"];

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List available MIDI ports
    Ports,

    /// Identify the device and show user module capacities
    Info,

    /// Send a search-device request
    Search {
        /// Echo back id (0-127)
        #[arg(long, default_value_t = 33)]
        echo_id: u8,
    },

    /// List user slots
    Slots {
        /// Only this module type
        #[arg(short = 'm', long = "module-type")]
        category: Option<ModuleCategory>,
    },

    /// Fetch a unit from a user slot
    Fetch {
        #[arg(short = 'm', long = "module-type")]
        category: ModuleCategory,
        #[arg(short, long)]
        slot: u8,
        /// Where to save the unit
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Install a unit into a user slot
    Install {
        #[arg(short = 'm', long = "module-type")]
        category: ModuleCategory,
        #[arg(short, long)]
        slot: u8,
        /// Unit file to install
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Clear a user slot
    Clear {
        #[arg(short = 'm', long = "module-type")]
        category: ModuleCategory,
        #[arg(short, long)]
        slot: u8,
    },

    /// Clear every slot of a module type
    ClearModule {
        #[arg(short = 'm', long = "module-type")]
        category: ModuleCategory,
    },

    /// Swap two user slots
    Swap {
        #[arg(short = 'm', long = "module-type")]
        category: ModuleCategory,
        slot_a: u8,
        slot_b: u8,
    },

    /// Save programs to a preset file
    Save {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Load programs from a preset file
    Load {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Write the effective configuration to the config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run one command
pub async fn run(command: Command, config: &LibrarianConfig, config_path: &Path) -> Result<()> {
    match command {
        Command::Ports => list_ports_formatted(),
        Command::InitConfig { force } => init_config(config, config_path, force).await,
        command => {
            let device = connect(config)?;
            execute(&device, command).await
        }
    }
}

/// Open the configured ports and wrap them in a device
fn connect(config: &LibrarianConfig) -> Result<Device<MidiPortTransport>> {
    let transport = MidiPortTransport::open(&config.midi.input_port, &config.midi.output_port)
        .context("Failed to open MIDI ports (run `ports` to list them)")?;

    let family = config.device.family;
    let session = Session::new(transport, family.header(config.device.channel))
        .with_max_packet_size(config.session.max_packet_size);

    Ok(Device::with_session(session, family).with_timeout(config.session.timeout()))
}

/// Execute a device command against an already connected device
pub async fn execute<T: Transport>(device: &Device<T>, command: Command) -> Result<()> {
    if let Command::Search { echo_id } = command {
        let identity = device.search(echo_id).await?;
        let (major, minor) = identity.firmware();
        println!(
            "{} {} on channel {} (firmware {}.{})",
            "Found".green(),
            identity.family.to_string().bold(),
            identity.channel + 1,
            major,
            minor
        );
        return Ok(());
    }

    let session = device.probe().await.context("Device inquiry failed")?;

    match command {
        Command::Info => show_info(device, &session).await,
        Command::Slots { category } => {
            let categories = match category {
                Some(c) => vec![c],
                None => ModuleCategory::ALL.to_vec(),
            };
            for category in categories {
                let slots = device.list_slots(category).await?;
                print_slots(category, &slots);
            }
            Ok(())
        }
        Command::Fetch {
            category,
            slot,
            file,
        } => {
            let data = device.fetch_slot_data(category, slot).await?;
            fs::write(&file, &data)
                .await
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!(
                "{} {} slot {} to {} ({})",
                "Fetched".green(),
                category,
                slot,
                file.display(),
                format_size(data.len())
            );
            Ok(())
        }
        Command::Install {
            category,
            slot,
            file,
        } => {
            let data = fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let info = device.module_info(category).await?;
            if data.len() > info.max_load_size as usize {
                bail!(
                    "{} is {} but {} units are limited to {}",
                    file.display(),
                    format_size(data.len()),
                    category,
                    format_size(info.max_load_size as usize)
                );
            }
            device.install_slot_data(category, slot, &data).await?;
            println!(
                "{} {} into {} slot {}",
                "Installed".green(),
                file.display(),
                category,
                slot
            );
            Ok(())
        }
        Command::Clear { category, slot } => {
            device.clear_slot(category, slot).await?;
            println!("{} {} slot {}", "Cleared".green(), category, slot);
            Ok(())
        }
        Command::ClearModule { category } => {
            device.clear_module(category).await?;
            println!("{} all {} slots", "Cleared".green(), category);
            Ok(())
        }
        Command::Swap {
            category,
            slot_a,
            slot_b,
        } => {
            device.swap_slots(category, slot_a, slot_b).await?;
            println!(
                "{} {} slots {} and {}",
                "Swapped".green(),
                category,
                slot_a,
                slot_b
            );
            Ok(())
        }
        Command::Save { file } => {
            let preset = preset::capture(device).await?;
            preset.save_to_file(&file).await?;
            println!(
                "{} {} program(s) to {}",
                "Saved".green(),
                preset.programs.len(),
                file.display()
            );
            Ok(())
        }
        Command::Load { file } => {
            let preset = PresetFile::load_from_file(&file).await?;
            preset::restore(device, &preset).await?;
            println!(
                "{} {} program(s) from {}",
                "Loaded".green(),
                preset.programs.len(),
                file.display()
            );
            Ok(())
        }
        Command::Ports | Command::InitConfig { .. } | Command::Search { .. } => Ok(()),
    }
}

async fn show_info<T: Transport>(device: &Device<T>, session: &DeviceSession) -> Result<()> {
    let identity = &session.identity;
    let (major, minor) = identity.firmware();

    println!("\n{}", format!("=== {} ===", identity.family).bold().cyan());
    println!("  Channel:       {}", identity.channel + 1);
    println!("  Firmware:      {}.{}", major, minor);
    println!("  User API:      {}", session.api_version.to_string().green());

    println!("\n{}", "User modules:".bold());
    for category in ModuleCategory::ALL {
        let info = device.module_info(category).await?;
        println!(
            "  {:<6} {:>2} slots, max unit {}, max program {}",
            category.to_string().bright_white(),
            info.slot_count,
            format_size(info.max_load_size as usize),
            format_size(info.max_program_size as usize)
        );
    }
    println!();
    Ok(())
}

fn print_slots(category: ModuleCategory, slots: &[SlotStatus]) {
    println!("\n{}", format!("{} slots:", category).bold());
    for status in slots {
        println!("  {}", format_slot_line(status));
    }
}

fn format_slot_line(status: &SlotStatus) -> String {
    match &status.occupancy {
        Occupancy::Empty => format!("{:>2}: {}", status.slot, "(empty)".dimmed()),
        Occupancy::Occupied(contents) => format!(
            "{:>2}: {:<20} v{}  unit {:08X}  dev {:08X}",
            status.slot,
            contents.name.bright_white(),
            contents.unit_version(),
            contents.unit_id,
            contents.dev_id
        ),
    }
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Print discovered ports with physical/virtual markers
pub fn list_ports_formatted() -> Result<()> {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    let inputs = discovery::input_ports()?;
    let outputs = discovery::output_ports()?;

    for (title, ports) in [("Input Ports:", &inputs), ("Output Ports:", &outputs)] {
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "No ports found".dimmed());
        }
        for port in ports {
            let marker = if port.is_virtual {
                "[VIRTUAL]".yellow()
            } else {
                "[PHYSICAL]".green()
            };
            println!("  {} {}", marker, port.name);
        }
    }

    if let Some((input, output)) = discovery::find_device_ports(&inputs, &outputs, DEVICE_PATTERNS)
    {
        println!("\n{}", "Auto-detected logue device:".bold().bright_green());
        println!("  Input:  {}", input.bright_white());
        println!("  Output: {}", output.bright_white());
    }

    println!();
    Ok(())
}

async fn init_config(config: &LibrarianConfig, path: &Path, force: bool) -> Result<()> {
    if !force && fs::try_exists(path).await.unwrap_or(false) {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config.save(path).await?;
    info!("Configuration written to {}", path.display());
    println!("{} {}", "Wrote".green(), path.display());
    Ok(())
}
