//! Replay command - drive the server core from a scripted client session.
//!
//! Starts the worker pool, reduction threads, session registry and
//! dispatcher exactly as a server would, then feeds them the connects,
//! requests and disconnects listed in a script. When the script ends every
//! client is disconnected and the command waits for the last session to be
//! destroyed before stopping the pool.

mod handler;
mod script;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Args;
use tracing::{debug, info, warn};

use imgstream::config::{clamp_worker_threads, ConfigFile};
use imgstream::dispatch::Dispatcher;
use imgstream::pool::{PoolStats, WorkerPool};
use imgstream::reduce::ParallelReducer;
use imgstream::session::{SessionId, SessionRegistry};
use imgstream::task::Task;

use crate::error::CliError;
use crate::runner::CliRunner;

use handler::ReplayHandler;
pub use script::ScriptEvent;

/// Longest single sleep between timeout checks.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Arguments for `imgstream replay`.
#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Script of client events (one JSON object per line)
    pub script: PathBuf,

    /// Worker threads (overrides [workers] threads)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Config file to use instead of ~/.imgstream/config.ini
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Simulated handler latency in milliseconds
    #[arg(long, default_value = "5")]
    pub latency_ms: u64,

    /// Seconds to wait for sessions to be destroyed after the script ends
    #[arg(long, default_value = "10")]
    pub drain_timeout: u64,
}

/// Run the replay command.
pub fn run(args: ReplayArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.config.as_deref(), args.verbose)?;
    runner.log_startup("replay");

    let events = script::load(&args.script)?;
    let config = runner.config().clone();
    let threads = clamp_worker_threads(args.threads.unwrap_or(config.workers.threads));

    let reducer = ParallelReducer::new(config.workers.reduction_threads)
        .map_err(|e| CliError::Reducer(e.to_string()))?;
    let handler = Arc::new(ReplayHandler::new(
        &config.server.root_folder,
        Duration::from_millis(args.latency_ms),
        Arc::new(reducer),
    ));

    let mut pool = WorkerPool::<Task>::start(threads)?;
    let dispatcher = Dispatcher::new(pool.submitter(), config.animation.flow_window);
    let registry = SessionRegistry::new();

    info!(
        events = events.len(),
        threads,
        flow_window = config.animation.flow_window,
        "Replaying script"
    );

    let mut replay = Replay {
        config: &config,
        registry: &registry,
        dispatcher: &dispatcher,
        handler: &handler,
        clients: HashMap::new(),
        errors: 0,
    };
    let completed = replay.play(&events);
    let errors = replay.errors;

    let disconnected = registry.disconnect_all();
    let drained = wait_for_sessions(&registry, Duration::from_secs(args.drain_timeout));
    if !drained {
        warn!(
            live = registry.live_count(),
            "Sessions still alive after drain timeout"
        );
    }
    pool.stop();

    print_summary(
        &Summary {
            events: events.len(),
            completed,
            errors,
            disconnected,
            live: registry.live_count(),
            cancelled_reductions: handler.cancelled_reductions(),
        },
        &pool.stats(),
        &handler.calls(),
    );
    Ok(())
}

/// Playback state for one script run.
struct Replay<'a> {
    config: &'a ConfigFile,
    registry: &'a SessionRegistry,
    dispatcher: &'a Dispatcher,
    handler: &'a Arc<ReplayHandler>,
    clients: HashMap<String, SessionId>,
    errors: usize,
}

impl Replay<'_> {
    /// Apply events in order. Returns the number applied; fewer than
    /// `events.len()` when the exit timeout fired.
    fn play(&mut self, events: &[ScriptEvent]) -> usize {
        for (index, event) in events.iter().enumerate() {
            match event {
                ScriptEvent::Connect { client } => self.connect(client),
                ScriptEvent::Disconnect { client } => self.disconnect(client),
                ScriptEvent::Request { client, request } => {
                    let Some(session) = self
                        .clients
                        .get(client)
                        .and_then(|id| self.registry.get(*id))
                    else {
                        warn!(client, request = request.name(), "Request from unknown client");
                        self.errors += 1;
                        continue;
                    };
                    if self.dispatcher.dispatch(&session, request.clone()).is_err() {
                        self.errors += 1;
                    }
                }
                ScriptEvent::Sleep { ms } => {
                    if !self.sleep(Duration::from_millis(*ms)) {
                        return index + 1;
                    }
                }
            }
        }
        events.len()
    }

    fn connect(&mut self, client: &str) {
        if self.clients.contains_key(client) {
            warn!(client, "Client already connected");
            self.errors += 1;
            return;
        }
        let handler: Arc<ReplayHandler> = Arc::clone(self.handler);
        let id = self.registry.connect(handler);
        debug!(client, session = %id, "Script client mapped");
        self.clients.insert(client.to_string(), id);
    }

    fn disconnect(&mut self, client: &str) {
        let Some(id) = self.clients.remove(client) else {
            warn!(client, "Disconnect from unknown client");
            self.errors += 1;
            return;
        };
        match self.registry.disconnect(id) {
            Ok(release) => debug!(client, session = %id, ?release, "Script client released"),
            Err(e) => {
                warn!(client, session = %id, error = %e, "Disconnect failed");
                self.errors += 1;
            }
        }
    }

    /// Sleep while enforcing the flow and exit timeouts. Returns `false`
    /// when the exit timeout fired.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.config.animation.flow_timeout > 0 {
                let limit = Duration::from_secs(self.config.animation.flow_timeout);
                let aborted = self.registry.abort_stalled_animations(limit);
                if aborted > 0 {
                    warn!(aborted, "Aborted animations waiting for flow events");
                }
            }

            if self.config.server.exit_timeout > 0 {
                let limit = Duration::from_secs(self.config.server.exit_timeout);
                if self.registry.idle_for().is_some_and(|idle| idle >= limit) {
                    info!(
                        exit_timeout = self.config.server.exit_timeout,
                        "No clients connected, exiting"
                    );
                    return false;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Wait until every session has been destroyed. Returns `false` on timeout.
fn wait_for_sessions(registry: &SessionRegistry, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while registry.live_count() > 0 {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

struct Summary {
    events: usize,
    completed: usize,
    errors: usize,
    disconnected: usize,
    live: usize,
    cancelled_reductions: u64,
}

fn print_summary(
    summary: &Summary,
    pool: &PoolStats,
    calls: &BTreeMap<&'static str, u64>,
) {
    println!("Replay Summary");
    println!("==============");
    println!();
    println!("Script:");
    println!("  events applied:   {}/{}", summary.completed, summary.events);
    println!("  errors:           {}", summary.errors);
    println!();
    println!("Sessions:");
    println!("  disconnected at end: {}", summary.disconnected);
    println!("  still alive:         {}", summary.live);
    println!();
    println!("Worker pool:");
    println!("  enqueued:       {}", pool.enqueued);
    println!("  executed:       {}", pool.executed);
    println!("  continuations:  {}", pool.continuations);
    println!("  panicked:       {}", pool.panicked);
    println!("  abandoned:      {}", pool.abandoned);
    println!();
    println!("Handler calls:");
    for (kind, count) in calls {
        println!("  {:<28} {}", kind, count);
    }
    if summary.cancelled_reductions > 0 {
        println!();
        println!("Cancelled reductions: {}", summary.cancelled_reductions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_script(
        config: &ConfigFile,
        text: &str,
    ) -> (usize, usize, SessionRegistry, WorkerPool<Task>) {
        let events = script::parse(text).unwrap();
        let reducer = Arc::new(ParallelReducer::new(1).unwrap());
        let handler = Arc::new(ReplayHandler::new(
            &config.server.root_folder,
            Duration::ZERO,
            reducer,
        ));
        let pool = WorkerPool::<Task>::start(2).unwrap();
        let dispatcher = Dispatcher::new(pool.submitter(), config.animation.flow_window);
        let registry = SessionRegistry::new();

        let mut replay = Replay {
            config,
            registry: &registry,
            dispatcher: &dispatcher,
            handler: &handler,
            clients: HashMap::new(),
            errors: 0,
        };
        let completed = replay.play(&events);
        let errors = replay.errors;
        drop(replay);
        (completed, errors, registry, pool)
    }

    #[test]
    fn test_replay_connect_request_disconnect() {
        let config = ConfigFile::default();
        let script = r#"
{"event":"connect","client":"a"}
{"event":"request","client":"a","request":{"type":"open_file","file_id":0,"path":"cube.fits"}}
{"event":"request","client":"a","request":{"type":"add_required_tiles","file_id":0,"tiles":[1,2,3]}}
{"event":"disconnect","client":"a"}
"#;
        let (completed, errors, registry, mut pool) = play_script(&config, script);
        assert_eq!(completed, 4);
        assert_eq!(errors, 0);
        assert_eq!(registry.connected_count(), 0);

        assert!(wait_for_sessions(&registry, Duration::from_secs(10)));
        pool.stop();
    }

    #[test]
    fn test_replay_counts_unknown_clients() {
        let config = ConfigFile::default();
        let script = r#"
{"event":"request","client":"ghost","request":{"type":"cancel_histogram"}}
{"event":"disconnect","client":"ghost"}
{"event":"connect","client":"a"}
{"event":"connect","client":"a"}
"#;
        let (completed, errors, registry, mut pool) = play_script(&config, script);
        assert_eq!(completed, 4);
        assert_eq!(errors, 3);
        assert_eq!(registry.disconnect_all(), 1);
        pool.stop();
    }

    #[test]
    fn test_exit_timeout_stops_replay() {
        let mut config = ConfigFile::default();
        config.server.exit_timeout = 1;
        let script = r#"
{"event":"connect","client":"a"}
{"event":"disconnect","client":"a"}
{"event":"sleep","ms":5000}
{"event":"connect","client":"b"}
"#;
        let started = Instant::now();
        let (completed, _, registry, mut pool) = play_script(&config, script);
        assert_eq!(completed, 3);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(registry.connected_count(), 0);
        pool.stop();
    }

    #[test]
    fn test_wait_for_sessions_with_no_sessions() {
        let registry = SessionRegistry::new();
        assert!(wait_for_sessions(&registry, Duration::ZERO));
    }
}
