use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use bookoo_ultra::{logging, BookooScale, BookooScanner, ScaleConfig, StopCondition};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::time::sleep;

#[derive(Parser)]
#[command(name = "bookoo-ultra", about = "Talk to a Bookoo Themis Ultra scale")]
struct Cli {
    /// Scale MAC address or peripheral id; the first scale found is used otherwise.
    #[arg(long)]
    address: Option<String>,

    #[arg(long, default_value_t = 10)]
    scan_timeout: u64,

    #[arg(long, default_value_t = 20)]
    connect_timeout: u64,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// List scales in range.
    Scan,
    /// Print readings as they arrive.
    Watch {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    Tare,
    StartTimer,
    StopTimer,
    ResetTimer,
    TareStart,
    Beep { level: u8 },
    AutoOff { minutes: u8 },
    Smoothing { state: Toggle },
    Calibrate,
    StopCondition { condition: StopOn },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum StopOn {
    Flow,
    Container,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let scanner = BookooScanner::new().await?;
    let scan_timeout = Duration::from_secs(cli.scan_timeout);

    if let Action::Scan = cli.action {
        for scale in scanner.find_scales(scan_timeout).await? {
            println!("{}  {}", scale.address, scale.name);
        }
        return Ok(());
    }

    let address = match cli.address {
        Some(address) => address,
        None => scanner
            .find_scales(scan_timeout)
            .await?
            .into_iter()
            .next()
            .map(|scale| scale.address)
            .ok_or("no Bookoo scale found")?,
    };

    let config = ScaleConfig::default().with_connect_timeout(Duration::from_secs(cli.connect_timeout));
    let scale = Arc::new(BookooScale::with_config(Arc::new(scanner.transport()), address, config));
    scale.connect().await?;

    match cli.action {
        Action::Scan => {}
        Action::Watch { seconds } => {
            let reader = Arc::downgrade(&scale);
            scale.set_notify_hook(move || {
                let Some(scale) = reader.upgrade() else { return };
                match scale.readings() {
                    Some(r) if scale.connected() => println!(
                        "{:>8.2} {}  {:>6.2} g/s  {:>7.2} s  battery {}%",
                        r.weight,
                        r.device.weight_unit().symbol(),
                        r.flow_rate,
                        r.timer,
                        r.device.battery_level
                    ),
                    _ if !scale.connected() => println!("disconnected"),
                    _ => {}
                }
            });
            scale.spawn_keep_alive();
            sleep(Duration::from_secs(seconds)).await;
        }
        Action::Tare => scale.tare().await?,
        Action::StartTimer => scale.start_timer().await?,
        Action::StopTimer => scale.stop_timer().await?,
        Action::ResetTimer => scale.reset_timer().await?,
        Action::TareStart => scale.tare_and_start_timer().await?,
        Action::Beep { level } => scale.set_beep_level(level).await?,
        Action::AutoOff { minutes } => scale.set_auto_off_duration(minutes).await?,
        Action::Smoothing { state } => {
            scale
                .set_flow_rate_smoothing(matches!(state, Toggle::On))
                .await?
        }
        Action::Calibrate => scale.calibrate().await?,
        Action::StopCondition { condition } => {
            let condition = match condition {
                StopOn::Flow => StopCondition::FlowStopped,
                StopOn::Container => StopCondition::ContainerRemoved,
            };
            scale.set_auto_mode_stop_condition(condition).await?
        }
    }

    // let the queued command reach the scale before tearing the link down
    sleep(Duration::from_millis(300)).await;
    scale.disconnect().await;
    Ok(())
}
