use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use gimbal_core::{doctor as control_doctor, Actuator, ControlConfig, GimbalSession, TracingActuator};
use gimbal_link::{doctor as link_doctor, LinkConfig, LinkEvent, LinkServer};

#[derive(Debug, Parser)]
#[command(name = "gimbal", version, about = "GimbalLink - phone gyro to gimbal mode arbitration")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sanity-check the config file.
    Doctor,
    /// Listen for a phone client and run the control loop until Ctrl-C.
    Run,
    /// Feed a capture of newline-delimited messages through the control core
    /// on a synthetic clock.
    Replay {
        file: String,
        /// Simulated time between consecutive messages.
        #[arg(long, default_value_t = 20)]
        interval_ms: u64,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default)]
    control: ControlConfig,
    link: Option<LinkConfig>,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run(&cfg).await?,
        Command::Replay { file, interval_ms } => replay_file(&cfg, &file, Duration::from_millis(interval_ms))?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    control_doctor::check_control(&cfg.control)?;
    match &cfg.link {
        Some(link) => link_doctor::check_link(link)?,
        None => warn!("doctor: no [link] section; only replay will work"),
    }
    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    let link_cfg = cfg.link.as_ref().context("no [link] config section")?;
    control_doctor::check_control(&cfg.control)?;
    info!("run: starting");

    let server = LinkServer::bind(link_cfg).await?;
    info!("link: listening on {}", server.local_addr()?);

    let (tx, mut rx) = mpsc::channel::<LinkEvent>(link_cfg.event_queue());
    let mut link_task = tokio::spawn(server.serve(tx));

    // Sole owner of the control state. Link events and ticks are handled
    // one at a time by this loop.
    let mut session = GimbalSession::new(&cfg.control, TracingActuator::default());
    info!(
        "run: mode={} deadband={} rad/s timeout={:?} tick={:?}",
        session.mode(),
        cfg.control.deadband(),
        cfg.control.timeout(),
        cfg.control.tick()
    );

    let mut tick = tokio::time::interval(cfg.control.tick());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("run: shutdown requested");
                break;
            }
            res = &mut link_task => {
                match res {
                    Ok(Ok(())) => warn!("link: server stopped"),
                    Ok(Err(e)) => return Err(e.context("link server")),
                    Err(e) => return Err(anyhow::Error::new(e).context("link task")),
                }
                break;
            }
            _ = tick.tick() => {
                session.on_tick(Instant::now());
            }
            ev = rx.recv() => match ev {
                Some(LinkEvent::Connected { .. }) => session.on_connect(),
                Some(LinkEvent::Disconnected { .. }) => {
                    session.on_disconnect();
                }
                Some(LinkEvent::Message { payload, .. }) => {
                    // rejected frames are already logged by the dispatcher
                    let _ = session.on_message(&payload, Instant::now());
                }
                None => {
                    warn!("link: event channel closed");
                    break;
                }
            },
        }
    }

    link_task.abort();
    session.on_disconnect();
    let stats = session.stats();
    info!(
        "run: stopped (accepted={} ignored={} dropped={} unknown={} actuated={})",
        stats.accepted,
        stats.ignored,
        stats.dropped,
        stats.unknown,
        session.actuator().driven()
    );
    Ok(())
}

fn replay_file(cfg: &Config, path: &str, interval: Duration) -> Result<()> {
    control_doctor::check_control(&cfg.control)?;
    let input = std::fs::read_to_string(path).with_context(|| format!("read replay file {}", path))?;

    let mut session = GimbalSession::new(&cfg.control, TracingActuator::default());
    for line in replay(&mut session, &input, interval, cfg.control.tick(), Instant::now()) {
        println!("{}", line);
    }

    let stats = session.stats();
    println!(
        "final mode={} accepted={} ignored={} dropped={} unknown={} actuated={}",
        session.mode(),
        stats.accepted,
        stats.ignored,
        stats.dropped,
        stats.unknown,
        session.actuator().driven()
    );
    Ok(())
}

/// Drive `session` from a capture. Each non-comment line advances the clock
/// by `interval`; ticks fire every `tick` in between. Directives:
/// `!disconnect` simulates a transport drop, `!wait <ms>` advances the clock
/// without a message.
fn replay<A: Actuator>(
    session: &mut GimbalSession<A>,
    input: &str,
    interval: Duration,
    tick: Duration,
    start: Instant,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut now = start;
    let mut last_tick = start;

    let ms = |t: Instant| t.saturating_duration_since(start).as_millis();

    let mut run_ticks = |session: &mut GimbalSession<A>, until: Instant, out: &mut Vec<String>| {
        while last_tick + tick <= until {
            last_tick += tick;
            if let Some(c) = session.on_tick(last_tick).change {
                out.push(format!("t={}ms tick: {} -> {} ({:?})", ms(last_tick), c.from, c.to, c.cause));
            }
        }
    };

    for (n, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(arg) = line.strip_prefix("!wait") {
            match arg.trim().parse::<u64>() {
                Ok(wait) => {
                    now += Duration::from_millis(wait);
                    run_ticks(session, now, &mut out);
                }
                Err(_) => out.push(format!("line {}: bad !wait argument '{}'", n + 1, arg.trim())),
            }
            continue;
        }

        now += interval;
        run_ticks(session, now, &mut out);

        if line == "!disconnect" {
            let change = session.on_disconnect();
            out.push(format!("t={}ms line {}: disconnect mode={} ({:?})", ms(now), n + 1, session.mode(), change.map(|c| c.cause)));
            continue;
        }

        match session.on_message(line.as_bytes(), now) {
            Ok(d) => out.push(format!("t={}ms line {}: {:?} mode={}", ms(now), n + 1, d, session.mode())),
            Err(e) => out.push(format!("t={}ms line {}: dropped: {}", ms(now), n + 1, e)),
        }
    }

    // let a trailing silence play out so a pending timeout shows up
    let end = now + session.controller().watchdog().timeout() + tick;
    run_ticks(session, end, &mut out);
    out
}
