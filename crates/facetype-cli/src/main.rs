use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use facetype_core::{HashDeriver, ResultDeriver};
use facetype_hw::Camera;

// `#[zbus::proxy]` generates `FaceTypeProxy` (async) and `FaceTypeProxyBlocking`.
#[zbus::proxy(
    interface = "org.sweetapps.FaceType1",
    default_service = "org.sweetapps.FaceType1",
    default_path = "/org/sweetapps/FaceType1"
)]
trait FaceType {
    async fn press_shutter(&self) -> zbus::Result<String>;
    async fn acknowledge(&self) -> zbus::Result<bool>;
    async fn set_timer(&self, secs: u32) -> zbus::Result<u32>;
    async fn set_flash(&self, mode: &str) -> zbus::Result<String>;
    async fn cycle_flash(&self) -> zbus::Result<String>;
    async fn set_lens(&self, lens: &str) -> zbus::Result<String>;
    async fn cycle_aspect_ratio(&self) -> zbus::Result<String>;
    async fn set_camera_permission(&self, granted: bool) -> zbus::Result<()>;
    async fn status(&self) -> zbus::Result<String>;
    async fn history(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facetype", about = "FaceType capture daemon CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Permission {
    Grant,
    Deny,
}

#[derive(Subcommand)]
enum Commands {
    /// Press the shutter
    Shutter,
    /// Dismiss the current result
    Ack,
    /// Set the self-timer
    Timer {
        /// Seconds: 0, 3 or 5
        secs: u32,
    },
    /// Set the flash mode, or cycle it (off, on, auto) when none is given
    Flash {
        /// "off", "on" or "auto"
        mode: Option<String>,
    },
    /// Select the camera lens
    Lens {
        /// "front" or "back"
        lens: String,
    },
    /// Cycle aspect ratio (full, 3:4, 1:1)
    Ratio,
    /// Grant or deny camera permission
    Permission {
        #[arg(value_enum)]
        decision: Permission,
    },
    /// Show daemon status
    Status,
    /// List captured results, most recent first
    History,
    /// Derive the result for an identity locally, without the daemon
    Derive {
        /// Image identity, e.g. shot_1700000000000.jpg
        identity: String,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Derive { identity } => {
            let result = HashDeriver.derive(&identity);
            println!("{identity}: {} ({})", result.label, result.score);
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for device in devices {
                println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
            }
        }
        remote => {
            let conn = zbus::Connection::session()
                .await
                .context("failed to connect to the session bus")?;
            let proxy = FaceTypeProxy::new(&conn)
                .await
                .context("facetyped is not reachable")?;
            tracing::debug!("connected to facetyped");
            run_remote(&proxy, remote).await?;
        }
    }

    Ok(())
}

async fn run_remote(proxy: &FaceTypeProxy<'_>, command: Commands) -> Result<()> {
    match command {
        Commands::Shutter => match proxy.press_shutter().await?.as_str() {
            "started" => println!("Capture started"),
            "ignored" => println!("Capture already in progress, or a result is awaiting ack"),
            "permission_requested" => println!("Camera permission required"),
            other => println!("{other}"),
        },
        Commands::Ack => {
            if proxy.acknowledge().await? {
                println!("Result dismissed");
            } else {
                println!("No result to dismiss");
            }
        }
        Commands::Timer { secs } => {
            let secs = proxy.set_timer(secs).await?;
            println!("Timer: {secs}s");
        }
        Commands::Flash { mode } => {
            let mode = match mode {
                Some(mode) => proxy.set_flash(&mode).await?,
                None => proxy.cycle_flash().await?,
            };
            println!("Flash: {mode}");
        }
        Commands::Lens { lens } => println!("Lens: {}", proxy.set_lens(&lens).await?),
        Commands::Ratio => println!("Aspect ratio: {}", proxy.cycle_aspect_ratio().await?),
        Commands::Permission { decision } => {
            let granted = matches!(decision, Permission::Grant);
            proxy.set_camera_permission(granted).await?;
            println!("Camera permission {}", if granted { "granted" } else { "denied" });
        }
        Commands::Status => println!("{}", pretty(&proxy.status().await?)?),
        Commands::History => print_history(&proxy.history().await?)?,
        // Offline; handled in main.
        Commands::Derive { .. } | Commands::Devices => {}
    }
    Ok(())
}

fn pretty(json: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(json).context("malformed reply")?;
    Ok(serde_json::to_string_pretty(&value)?)
}

fn print_history(json: &str) -> Result<()> {
    let records: Vec<serde_json::Value> =
        serde_json::from_str(json).context("malformed history reply")?;
    if records.is_empty() {
        println!("No captures yet");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {}  {} ({})",
            record["recorded_at"].as_str().unwrap_or("-"),
            record["image"]["identity"].as_str().unwrap_or("-"),
            record["result"]["label"].as_str().unwrap_or("?"),
            record["result"]["score"],
        );
    }
    Ok(())
}
