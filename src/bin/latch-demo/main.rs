use countdown_latch::{CountdownLatch, LatchError, Result};
use tracing_subscriber;
use tracing::{info, error};
use clap::Parser;
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

async fn connect(id: i32, latch: Arc<CountdownLatch>, delay: Duration) {
    // stand-in for dialing a peer
    time::sleep(delay).await;
    match latch.signal() {
        Ok(true) => info!("connector-{} UP, {} outstanding", id, latch.current_count()),
        Ok(false) => info!("connector-{} UP, latch already set", id),
        Err(err) => error!(cause = %err, "connector-{} failed to signal", id),
    }
}

fn spawn_waiter(id: usize, latch: Arc<CountdownLatch>, timeout_ms: i64) -> JoinHandle<(usize, std::result::Result<bool, LatchError>)> {
    tokio::task::spawn_blocking(move || {
        let outcome = latch.wait_timeout_ms(timeout_ms);
        (id, outcome)
    })
}


#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Options {
    /// connectors that must come up before the waiters are released
    #[clap(short, long)]
    #[clap(default_value_t = 4)]
    connectors: i32,

    /// blocking waiters parked on the latch
    #[clap(short, long)]
    #[clap(default_value_t = 2)]
    waiters: usize,

    /// upper bound of each connector's random delay, in milliseconds
    #[clap(short, long)]
    #[clap(default_value_t = 200)]
    jitter_ms: u64,

    /// how long each waiter waits, in milliseconds
    #[clap(short, long)]
    #[clap(default_value_t = 1000)]
    timeout_ms: i64,

    /// dispose the latch once half of the connectors are up
    #[clap(short, long)]
    abandon: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let options = Options::parse();
    info!("starting at {}", chrono::Local::now().format("%Y/%m/%d-%H:%M:%S%.6f"));
    let start = Instant::now();

    let latch = Arc::new(CountdownLatch::new(options.connectors)?);

    let waiters: Vec<_> = (0..options.waiters)
        .map(|id| spawn_waiter(id, Arc::clone(&latch), options.timeout_ms))
        .collect();

    let connecting = if options.abandon { options.connectors / 2 } else { options.connectors };
    let mut connectors = Vec::with_capacity(connecting as usize);
    for id in 0..connecting {
        let delay = Duration::from_millis(rand::thread_rng().gen_range(0..=options.jitter_ms));
        connectors.push(tokio::spawn(connect(id, Arc::clone(&latch), delay)));
    }
    for connector in connectors {
        connector.await?;
    }

    if options.abandon {
        info!("abandoning latch with {} outstanding", latch.current_count());
        latch.dispose();
    }

    let mut timed_out = 0;
    for waiter in waiters {
        let (id, outcome) = waiter.await?;
        match outcome {
            Ok(true) => info!("waiter-{} released after {:?}", id, start.elapsed()),
            Ok(false) => {
                timed_out += 1;
                error!("waiter-{} timed out after {:?}", id, start.elapsed());
            }
            Err(LatchError::Disposed) => info!("waiter-{} released by dispose", id),
            Err(err) => return Err(err.into()),
        }
    }

    if timed_out > 0 {
        return Err(format!("{} waiter(s) timed out", timed_out).into());
    }
    info!("done in {:?}", start.elapsed());
    Ok(())
}
