//! Latency and claim-fairness demo for the SPMC seqlock ring.
//!
//! Cross-process over shared memory (run in two terminals):
//!
//! ```text
//! cargo run --release --example bench -- writer
//! cargo run --release --example bench -- reader
//! ```
//!
//! In-process cooperative broadcast:
//!
//! ```text
//! cargo run --release --example bench -- broadcast --consumers 4
//! ```

#[cfg(all(unix, not(feature = "loom")))]
mod demo {
    use clap::{Parser, Subcommand};
    use seqring::RingBuffer;
    use seqring::shm::ShmRing;
    use std::sync::atomic::{AtomicBool, Ordering};

    const TRIALS: usize = 100_000;

    #[derive(Parser, Debug)]
    #[command(version, about = "Demos for the SPMC seqlock ring buffer", long_about = None)]
    struct Args {
        #[command(subcommand)]
        command: Commands,
    }

    #[derive(Subcommand, Debug)]
    enum Commands {
        /// Publishes timestamped messages into a shared-memory ring.
        Writer {
            /// Minimum period between messages in nanoseconds; 0 disables throttling.
            #[arg(short = 'p', long = "period", default_value_t = 1_000)]
            period: u64,

            /// Shared-memory region name, which must begin with '/'.
            #[arg(short = 'n', long = "name", default_value = "/seqring-demo")]
            name: String,
        },

        /// Consumes messages from a shared-memory ring and reports wire latency.
        Reader {
            /// Shared-memory region name, which must begin with '/'.
            #[arg(short = 'n', long = "name", default_value = "/seqring-demo")]
            name: String,
        },

        /// Runs one writer and several consumers sharing one reader state.
        Broadcast {
            /// Number of consumer threads cooperating on the shared reader.
            #[arg(short = 'c', long = "consumers", default_value_t = 4)]
            consumers: usize,
        },
    }

    pub fn run() -> std::io::Result<()> {
        let args = Args::parse();

        match args.command {
            Commands::Writer { period, name } => {
                println!("writer: name {name:?}, period {period} ns, trials {TRIALS}");
                let ring = ShmRing::<8, 256>::open(&name)?;
                writer(&ring, period);
                Ok(())
            }

            Commands::Reader { name } => {
                println!("reader: name {name:?}, trials {TRIALS}");
                let ring = ShmRing::<8, 256>::open(&name)?;
                reader(&ring);
                Ok(())
            }

            Commands::Broadcast { consumers } => {
                broadcast(consumers);
                Ok(())
            }
        }
    }

    fn writer(ring: &RingBuffer<8, 256>, period: u64) {
        let mut guard = ring.try_lock().expect("another writer holds the claim");
        let mut push_ns = Vec::with_capacity(TRIALS);

        for _ in 0..TRIALS {
            let ts0 = mono_time_ns();
            guard.push_back(ts0.to_le_bytes());
            let ts1 = mono_time_ns();
            push_ns.push(ts1 - ts0);
            delay(ts0 + period);
        }

        report("push_back ns", &mut push_ns);
    }

    fn reader(ring: &RingBuffer<8, 256>) {
        let state = ring.reader();
        let mut wire_ns = Vec::with_capacity(TRIALS);

        while wire_ns.len() < TRIALS {
            if let Some(message) = state.pop_front() {
                let sent = u64::from_le_bytes(message);
                wire_ns.push(mono_time_ns().saturating_sub(sent));
            } else {
                core::hint::spin_loop();
            }
        }

        report("wire ns", &mut wire_ns);
    }

    fn broadcast(consumers: usize) {
        let cores = core_affinity::get_core_ids().unwrap_or_default();
        let consumers = consumers.max(1);
        println!("broadcast: {consumers} consumers, {TRIALS} messages, {} cores", cores.len());

        let ring: RingBuffer<8, 256> = RingBuffer::new();
        let mut guard = ring.try_lock().expect("fresh ring");
        let shared = ring.reader();
        let done = AtomicBool::new(false);

        let counts: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..consumers)
                .map(|i| {
                    let shared = &shared;
                    let done = &done;
                    // Writer gets core 0; consumers spread over the rest.
                    let core = cores.get(1 + i % cores.len().max(1)).copied();
                    s.spawn(move || {
                        if let Some(core) = core {
                            core_affinity::set_for_current(core);
                        }
                        let mut claimed = 0usize;
                        loop {
                            while shared.pop_front().is_some() {
                                claimed += 1;
                            }
                            if done.load(Ordering::Acquire) {
                                while shared.pop_front().is_some() {
                                    claimed += 1;
                                }
                                break claimed;
                            }
                            std::thread::yield_now();
                        }
                    })
                })
                .collect();

            if let Some(core) = cores.first().copied() {
                core_affinity::set_for_current(core);
            }
            for i in 0..TRIALS as u64 {
                guard.push_back(i.to_le_bytes());
                std::thread::yield_now();
            }
            done.store(true, Ordering::Release);

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let total: usize = counts.iter().sum();
        for (i, claimed) in counts.iter().enumerate() {
            println!("consumer {i}: {claimed} messages");
        }
        println!("total claimed: {total} of {TRIALS} published (overrun drops the rest)");
    }

    /// Busy-waits until the monotonic clock reaches `deadline_ns`.
    #[inline(always)]
    fn delay(deadline_ns: u64) {
        while mono_time_ns() < deadline_ns {}
    }

    /// Monotonic timestamp in nanoseconds, comparable across processes.
    #[inline(always)]
    fn mono_time_ns() -> u64 {
        use libc::{CLOCK_MONOTONIC, clock_gettime, timespec};
        unsafe {
            let mut ts = timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            clock_gettime(CLOCK_MONOTONIC, &mut ts);
            (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
        }
    }

    fn report(title: &str, samples: &mut Vec<u64>) {
        samples.sort_unstable();
        let q = |p: f64| samples[((samples.len() - 1) as f64 * p).round() as usize];
        println!(
            "{title}: n={}, min={}, p50={}, p90={}, p99={}, p999={}, max={}",
            samples.len(),
            q(0.0),
            q(0.5),
            q(0.9),
            q(0.99),
            q(0.999),
            q(1.0),
        );
    }
}

#[cfg(all(unix, not(feature = "loom")))]
fn main() -> std::io::Result<()> {
    demo::run()
}

#[cfg(any(not(unix), feature = "loom"))]
fn main() {
    eprintln!("the bench demo needs a unix target and the default feature set");
}
