use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use futures_lite::StreamExt;
use nusb::hotplug::HotplugEvent;
use nusb::transfer::EndpointType;
use nusb::{Device, DeviceId, DeviceInfo};
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::pin::pin;
use std::process;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tminit_lib::catalog::MODELS;
use tminit_lib::constants::{DEFAULT_INTERFACE, PRIMING_ENDPOINT_INDEX, is_supported};
use tminit_lib::{PrimingPolicy, Session, SessionConfig, State, TmError, UsbTransport};

/// Switches Thrustmaster force feedback wheels out of their boot mode.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize every wheel that is connected right now.
    Init {
        #[command(flatten)]
        session: SessionArgs,
        /// How long to wait for each handshake before giving up on it.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
    /// Initialize wheels as they are plugged in, until Ctrl+C.
    Watch {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Show connected wheels and their endpoints.
    List,
    /// Show the known wheel models.
    Models {
        /// Print the table as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct SessionArgs {
    /// What to do about the priming sequences.
    #[arg(long, value_enum, default_value_t = PrimingArg::Continue)]
    priming: PrimingArg,
    /// Timeout for each priming write.
    #[arg(long, default_value_t = 5_000)]
    priming_timeout_ms: u64,
    /// USB interface to claim.
    #[arg(long, default_value_t = DEFAULT_INTERFACE)]
    interface: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum PrimingArg {
    Continue,
    Abort,
    Skip,
}

impl From<PrimingArg> for PrimingPolicy {
    fn from(arg: PrimingArg) -> Self {
        match arg {
            PrimingArg::Continue => PrimingPolicy::Continue,
            PrimingArg::Abort => PrimingPolicy::Abort,
            PrimingArg::Skip => PrimingPolicy::Skip,
        }
    }
}

impl SessionArgs {
    fn config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_interface(self.interface)
            .with_priming(self.priming.into())
            .with_priming_timeout(Duration::from_millis(self.priming_timeout_ms))
    }
}

fn setup_logging(
    log_file_path: Option<PathBuf>,
    verbosity: &Verbosity<InfoLevel>,
) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path)
            .with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v; RUST_LOG still wins
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file, &cli.verbose)?;

    let result = match cli.command {
        Command::Init {
            session,
            timeout_ms,
        } => run_init(session.config(), Duration::from_millis(timeout_ms)).await,
        Command::Watch { session } => run_watch(session.config()).await,
        Command::List => run_list(),
        Command::Models { json } => run_models(json),
    };

    if let Err(e) = result {
        error!("{e:#}");
        process::exit(1);
    }

    Ok(())
}

fn matching_devices() -> Result<Vec<DeviceInfo>> {
    let devices = nusb::list_devices()
        .context("Failed to list USB devices")?
        .filter(|d| is_supported(d.vendor_id(), d.product_id()))
        .collect();
    Ok(devices)
}

fn device_span(info: &DeviceInfo) -> Span {
    info_span!("wheel", bus = info.bus_number(), addr = info.device_address())
}

async fn attach(info: &DeviceInfo, config: SessionConfig) -> Result<Session, TmError> {
    let transport = UsbTransport::open(info, config.interface)?;
    Session::attach(transport, config).await
}

fn describe(state: &State) -> String {
    match state.model() {
        Some(model) => format!("{state} ({})", model.name),
        None => state.to_string(),
    }
}

async fn run_init(config: SessionConfig, timeout: Duration) -> Result<()> {
    let devices = matching_devices()?;
    if devices.is_empty() {
        return Err(TmError::DeviceNotFound.into());
    }
    info!("Found {} wheel(s), priming policy: {}", devices.len(), config.priming);

    let mut pending = Vec::new();
    let mut outcomes = Vec::new();
    for info in &devices {
        let span = device_span(info);
        match attach(info, config).instrument(span.clone()).await {
            Ok(session) => pending.push((info, span, session)),
            Err(err) => {
                span.in_scope(|| error!("Failed to attach: {err}"));
                outcomes.push((info, format!("attach failed: {err}"), false));
            }
        }
    }

    for (info, span, session) in pending {
        let state = async {
            if tokio::time::timeout(timeout, session.wait()).await.is_err() {
                warn!("Handshake did not finish within {:?}, detaching", timeout);
            }
            session.detach().await
        }
        .instrument(span)
        .await;
        outcomes.push((info, describe(&state), matches!(state, State::SwitchAcked(_))));
    }

    for (info, outcome, _) in &outcomes {
        println!(
            "{:03}:{:03}  {}",
            info.bus_number(),
            info.device_address(),
            outcome
        );
    }

    if !outcomes.iter().any(|(_, _, acked)| *acked) {
        bail!("No wheel was switched");
    }
    Ok(())
}

/// A session running in its own task until it is told to stop.
struct Supervisor {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Supervisor {
    fn spawn(info: DeviceInfo, config: SessionConfig) -> Self {
        let (stop, stopped) = oneshot::channel();
        let span = device_span(&info);
        let task = tokio::spawn(supervise(info, config, stopped).instrument(span));
        Self { stop, task }
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            error!("Session task failed: {err}");
        }
    }
}

async fn supervise(info: DeviceInfo, config: SessionConfig, mut stopped: oneshot::Receiver<()>) {
    let session = tokio::select! {
        result = attach(&info, config) => match result {
            Ok(session) => session,
            Err(err) => {
                error!("Failed to attach: {err}");
                return;
            }
        },
        _ = &mut stopped => return,
    };

    tokio::select! {
        state = session.wait() => {
            info!("Handshake finished: {}", describe(&state));
            let _ = (&mut stopped).await;
        }
        _ = &mut stopped => {}
    }
    session.detach().await;
}

async fn run_watch(config: SessionConfig) -> Result<()> {
    let mut events = pin!(nusb::watch_devices().context("Failed to watch for USB devices")?);
    let mut sessions: HashMap<DeviceId, Supervisor> = HashMap::new();

    // Hotplug only reports changes, pick up what is already plugged in
    for info in matching_devices()? {
        sessions.insert(info.id(), Supervisor::spawn(info, config));
    }
    info!("Watching for wheels ({} already connected), Ctrl+C to stop", sessions.len());

    let mut ctrl_c = pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, detaching {} session(s)", sessions.len());
                break;
            }
            event = events.next() => match event {
                Some(HotplugEvent::Connected(info)) => {
                    if is_supported(info.vendor_id(), info.product_id()) {
                        info!(
                            "Wheel connected on bus {} addr {}",
                            info.bus_number(),
                            info.device_address()
                        );
                        let id = info.id();
                        if let Some(old) = sessions.insert(id, Supervisor::spawn(info, config)) {
                            old.stop().await;
                        }
                    }
                }
                Some(HotplugEvent::Disconnected(id)) => {
                    if let Some(supervisor) = sessions.remove(&id) {
                        debug!(?id, "Wheel disconnected");
                        supervisor.stop().await;
                    }
                }
                None => {
                    warn!("Hotplug stream ended");
                    break;
                }
            },
        }
    }

    for (_, supervisor) in sessions.drain() {
        supervisor.stop().await;
    }
    Ok(())
}

fn run_list() -> Result<()> {
    let devices = matching_devices()?;
    if devices.is_empty() {
        warn!("No Thrustmaster wheels found");
        return Ok(());
    }

    for info in devices {
        println!(
            "Bus {:03} Address {:03}: {:04x}:{:04x} {}",
            info.bus_number(),
            info.device_address(),
            info.vendor_id(),
            info.product_id(),
            info.product_string().unwrap_or("(unknown product)")
        );
        match info.open() {
            Ok(device) => print_endpoints(&device),
            Err(e) => error!(
                "Failed to open device: {:?}. Check permissions (udev rules on Linux).",
                e
            ),
        }
    }
    Ok(())
}

fn print_endpoints(device: &Device) {
    let config = match device.active_configuration() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to get active configuration: {:?}", e);
            return;
        }
    };
    for group in config.interfaces() {
        for alt in group.alt_settings() {
            println!(
                "  Interface {} alt {} (class {:#04x})",
                alt.interface_number(),
                alt.alternate_setting(),
                alt.class()
            );
            for (index, endpoint) in alt.endpoints().enumerate() {
                let address = endpoint.address();
                let direction = if (address & 0x80) != 0 { "IN" } else { "OUT" };
                let transfer_type = match endpoint.transfer_type() {
                    EndpointType::Control => "Control",
                    EndpointType::Isochronous => "Isochronous",
                    EndpointType::Bulk => "Bulk",
                    EndpointType::Interrupt => "Interrupt",
                };
                let priming = alt.alternate_setting() == 0 && index == PRIMING_ENDPOINT_INDEX;
                println!(
                    "    Endpoint {:#04x} {:<3} {:<11} max packet {}{}",
                    address,
                    direction,
                    transfer_type,
                    endpoint.max_packet_size(),
                    if priming { "  <- priming" } else { "" }
                );
            }
        }
    }
}

fn run_models(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(MODELS)?);
        return Ok(());
    }
    for model in MODELS {
        println!(
            "{:#06x}  switch {:#06x}  {:<7}  {}",
            model.model_code,
            model.switch_value,
            model.support.to_string(),
            model.name
        );
    }
    Ok(())
}
