//! Run-loop assembly: backend wiring, loop pacing, the status stream, and the
//! scripted demo session.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use lift_config::Config;
use lift_core::mocks::ScriptPanel;
use lift_core::{InputSampler, Lift, LiftState, LiftStatus};
use lift_hardware::{SimBenchCfg, SimulatedBench};
use lift_traits::InputSnapshot;
use lift_traits::clock::MonotonicClock;

use crate::cli::RtLock;
use crate::rt::setup_rt_once;

/// Poll rate of the background input sampler [Hz]. Button edges reach the
/// controller within about one period, so keep this well above human timing.
const INPUT_HZ: u32 = 1_000;

/// Options shared by every backend.
#[derive(Debug, Clone, Copy)]
pub struct RunOpts {
    pub for_ms: Option<u64>,
    pub demo: bool,
    pub rt: bool,
    pub rt_prio: Option<i32>,
    pub rt_lock: Option<RtLock>,
    pub rt_cpu: Option<usize>,
    pub stats: bool,
    pub json: bool,
}

/// What a finished session reports back to the caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub final_state: &'static str,
    pub position_mm: f32,
    pub ticks: u64,
    pub profile: &'static str,
}

/// Stable reason name for a domain error, for machine-readable output.
pub fn error_reason_name(e: &lift_core::LiftError) -> &'static str {
    use lift_core::LiftError::*;
    match e {
        Hardware(_) => "Hardware",
        HardwareFault(_) => "HardwareFault",
        Config(_) => "Config",
        EndStopRecovery { .. } => "EndStopRecovery",
        ToolLengthRecovery { .. } => "ToolLengthRecovery",
        State(_) => "State",
        Io(_) => "Io",
    }
}

/// Milliseconds since the Unix epoch, for status records.
pub fn unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Run on the simulated bench. The bench couples the virtual carriage to the
/// sensor trip zones, so toolchange and auto-zero cycles complete without
/// hardware. With `demo`, the probe is plugged in and a scripted operator
/// session drives the panel.
pub fn run_sim(
    cfg: &Config,
    settings_path: &Path,
    opts: &RunOpts,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<RunSummary> {
    let bench = SimulatedBench::new(SimBenchCfg {
        probe_plugged: opts.demo,
        ..SimBenchCfg::default()
    });
    let panel = ScriptPanel::new();
    let script = opts.demo.then(|| DemoScript::new(panel.clone()));

    let store = lift_config::FileStore::open(settings_path).wrap_err("open settings store")?;
    let sampler = InputSampler::spawn(panel, INPUT_HZ, MonotonicClock::new());
    let mut lift = Lift::builder()
        .with_device(bench.stepper())
        .with_sensors(bench.sensors())
        .with_panel(sampler)
        .with_store(store)
        .with_machine(cfg.machine.clone())
        .build()?;
    lift.power_on()?;

    run_loop(cfg, opts, &mut lift, script, &shutdown, "sim")
}

/// Run against the Raspberry Pi GPIO backend.
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn run_hardware(
    cfg: &Config,
    settings_path: &Path,
    opts: &RunOpts,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<RunSummary> {
    use lift_hardware::gpio::{GpioPanel, GpioSensors, GpioStepper};

    let device = GpioStepper::new(&cfg.pins).wrap_err("open step driver pins")?;
    let sensors = GpioSensors::new(&cfg.pins).wrap_err("open sensor pins")?;
    let panel = GpioPanel::new(&cfg.pins).wrap_err("open panel pins")?;

    let store = lift_config::FileStore::open(settings_path).wrap_err("open settings store")?;
    let sampler = InputSampler::spawn(panel, INPUT_HZ, MonotonicClock::new());
    let mut lift = Lift::builder()
        .with_device(device)
        .with_sensors(sensors)
        .with_panel(sampler)
        .with_store(store)
        .with_machine(cfg.machine.clone())
        .build()?;
    lift.power_on()?;

    run_loop(cfg, opts, &mut lift, None, &shutdown, "hardware")
}

fn run_loop(
    cfg: &Config,
    opts: &RunOpts,
    lift: &mut Lift,
    mut script: Option<DemoScript>,
    shutdown: &AtomicBool,
    profile: &'static str,
) -> eyre::Result<RunSummary> {
    // Real-time mode setup (Linux/macOS), once per process
    #[cfg(target_os = "linux")]
    {
        let mode = opts.rt_lock.unwrap_or(RtLock::os_default());
        setup_rt_once(opts.rt, opts.rt_prio, mode, opts.rt_cpu);
    }
    #[cfg(target_os = "macos")]
    {
        let mode = opts.rt_lock.unwrap_or(RtLock::os_default());
        let _rt_prio = opts.rt_prio; // silence unused on non-Linux builds
        let _rt_cpu = opts.rt_cpu; // silence unused on non-Linux builds
        setup_rt_once(opts.rt, mode);
    }

    let tick = Duration::from_micros(cfg.control.tick_us);
    let render_every = Duration::from_millis(cfg.control.render_ms.max(1));
    let deadline = opts
        .for_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));

    let mut latencies: Vec<u64> = Vec::new();
    let mut missed_deadlines = 0usize;
    let mut ticks = 0u64;
    let mut last_frame = String::new();
    let mut last_render = Instant::now();
    let t0 = Instant::now();

    tracing::info!(profile, tick_us = cfg.control.tick_us, "run start");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break;
        }
        if let Some(d) = deadline
            && Instant::now() >= d
        {
            break;
        }

        let t_start = Instant::now();
        lift.tick()?;
        ticks += 1;
        if opts.stats {
            let latency = t_start.elapsed().as_micros() as u64;
            if latency > cfg.control.tick_us {
                missed_deadlines = missed_deadlines.saturating_add(1);
            }
            latencies.push(latency);
        }

        if last_render.elapsed() >= render_every {
            last_render = Instant::now();
            let status = lift.status()?;
            emit_status(&status, opts.json, t0, &mut last_frame);
            if let Some(s) = script.as_mut()
                && s.step(&status)
            {
                tracing::info!("demo session complete");
                break;
            }
        }

        let spent = t_start.elapsed();
        if spent < tick {
            std::thread::sleep(tick - spent);
        }
    }

    if opts.stats && !latencies.is_empty() {
        print_stats(&latencies, ticks, missed_deadlines, cfg.control.tick_us);
    }

    let status = lift.status()?;
    tracing::info!(state = %status.state, position_mm = status.position_mm, ticks, "run stop");
    Ok(RunSummary {
        final_state: status.state.as_str(),
        position_mm: status.position_mm,
        ticks,
        profile,
    })
}

/// Print one render period's worth of output: a JSONL record, or the display
/// frame when it changed.
fn emit_status(status: &LiftStatus, json: bool, t0: Instant, last_frame: &mut String) {
    if json {
        println!("{}", status_record(status, t0));
        return;
    }
    let frame = lift_ui::render(status).to_string();
    if frame != *last_frame {
        println!("{frame}\n");
        *last_frame = frame;
    }
}

fn status_record(status: &LiftStatus, t0: Instant) -> String {
    serde_json::json!({
        "timestamp": unix_ms(),
        "elapsed_ms": t0.elapsed().as_millis() as u64,
        "state": status.state.as_str(),
        "position_mm": status.position_mm,
        "position_steps": status.position_steps,
        "slow_mode": status.slow_mode,
        "target_mm": status.target_height_mm,
        "workspace": status.workspace.as_ref().map(|w| {
            serde_json::json!({
                "lower_mm": w.lower_mm,
                "upper_mm": w.upper_mm,
                "at_lower": w.at_lower,
                "at_upper": w.at_upper,
            })
        }),
        "tool_length": status.tool_length_enabled,
        "menu": status.menu.as_ref().map(|m| m.title),
        "message": status.message,
    })
    .to_string()
}

/// Print control-loop latency stats to stderr.
fn print_stats(latencies: &[u64], ticks: u64, missed_deadlines: usize, period_us: u64) {
    let min = *latencies.iter().min().unwrap_or(&0);
    let max = *latencies.iter().max().unwrap_or(&0);
    let avg = latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;
    let stdev = if latencies.len() > 1 {
        let mean = avg;
        let var = latencies
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / (latencies.len() as f64 - 1.0);
        var.sqrt()
    } else {
        0.0
    };
    eprintln!("\n--- Lift Stats ---");
    eprintln!("Ticks: {ticks}");
    eprintln!("Period (us): {period_us}");
    eprintln!("Tick latency min/avg/max/stdev (us): {min:.0} / {avg:.1} / {max:.0} / {stdev:.1}");
    eprintln!("Missed deadlines (> period): {missed_deadlines}");
    eprintln!("------------------\n");
}

/// Bring-up check: the config is already validated; verify the calibration
/// store parses and a controller built from the profile ticks cleanly.
pub fn self_check(cfg: &Config, settings_path: &Path) -> eyre::Result<()> {
    let store = lift_config::FileStore::open(settings_path).wrap_err("open settings store")?;

    let bench = SimulatedBench::new(SimBenchCfg::default());
    let mut lift = Lift::builder()
        .with_device(bench.stepper())
        .with_sensors(bench.sensors())
        .with_panel(ScriptPanel::new())
        .with_store(store)
        .with_machine(cfg.machine.clone())
        .build()?;
    lift.tick()?;

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        use lift_hardware::gpio::GpioStepper;
        // Claim and release the step driver pins to catch wiring/permission
        // problems before a real run.
        let _ = GpioStepper::new(&cfg.pins).wrap_err("probe step driver pins")?;
        println!("gpio: step/dir pins ok");
    }

    println!(
        "machine: {} steps/rev, direction {}",
        cfg.machine.steps_per_rev, cfg.machine.direction
    );
    println!("settings store: {}", settings_path.display());
    println!("controller: {}", lift.state());
    Ok(())
}

/// Scripted operator session against the simulated bench: toolchange homing,
/// slow-mode toggle, an encoder move into the workspace, arming the target
/// lock, then a full auto-zero cycle. Stages advance on observed status, so
/// the tour is robust to loop pacing.
struct DemoScript {
    panel: ScriptPanel,
    stage: usize,
    /// Position when the encoder move was fired, to detect the carriage moving.
    mark: i64,
}

impl DemoScript {
    fn new(panel: ScriptPanel) -> Self {
        Self {
            panel,
            stage: 0,
            mark: 0,
        }
    }

    fn press(&self, snap: InputSnapshot) {
        self.panel.push(snap);
    }

    /// Advance the script; returns true once the session is finished.
    fn step(&mut self, status: &LiftStatus) -> bool {
        match self.stage {
            0 => {
                tracing::info!("demo: toolchange homing");
                self.press(InputSnapshot {
                    toolchange_press: true,
                    ..InputSnapshot::default()
                });
                self.stage = 1;
            }
            1 if status.state == LiftState::DefaultStart && status.workspace.is_some() => {
                tracing::info!("demo: slow mode");
                self.press(InputSnapshot {
                    set_speed_press: true,
                    ..InputSnapshot::default()
                });
                self.stage = 2;
            }
            2 if status.slow_mode => {
                // Homing parks at the workspace edge; a negative detent moves
                // back into the band, so the guard permits it.
                tracing::info!("demo: encoder move");
                self.mark = status.position_steps;
                self.press(InputSnapshot {
                    encoder_delta: -2,
                    ..InputSnapshot::default()
                });
                self.stage = 3;
            }
            3 if status.position_steps != self.mark => {
                tracing::info!("demo: arm target lock");
                self.press(InputSnapshot {
                    set_speed_hold: true,
                    ..InputSnapshot::default()
                });
                self.stage = 4;
            }
            4 if status.target_height_mm.is_some() => {
                tracing::info!("demo: auto-zero");
                self.press(InputSnapshot {
                    set_zero_press: true,
                    ..InputSnapshot::default()
                });
                self.stage = 5;
            }
            5 if status.state == LiftState::DefaultStart
                && status.position_steps == 0
                && status.target_height_mm.is_none() =>
            {
                return true;
            }
            _ => {}
        }
        false
    }
}
