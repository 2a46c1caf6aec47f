// kring-tap: write hashed messages into a shared-memory ring set, or read
// them back from another process and check every payload.
use kring::{Host, Message, RingId, RingSetBuilder, RingSetRegistry};
use sha2::{Digest, Sha256};
use std::env;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} write <name> <num_messages> [--auto-exit]", program);
    eprintln!("       {} read <name>", program);
    std::process::exit(1);
}

fn digest(i: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("message_{}", i).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        usage(&args[0]);
    }
    match args[1].as_str() {
        "write" => {
            let Some(count) = args.get(3).and_then(|s| s.parse().ok()) else {
                usage(&args[0]);
            };
            let auto_exit = args.get(4).map(|s| s == "--auto-exit").unwrap_or(false);
            write(&args[2], count, auto_exit)
        }
        "read" => read(&args[2]),
        _ => usage(&args[0]),
    }
}

fn write(name: &str, count: usize, auto_exit: bool) -> Result<(), Box<dyn Error>> {
    println!("Writer: Precomputing {} hashes...", count);
    let start_precompute = Instant::now();
    let messages: Vec<String> = (0..count).map(|i| format!("{}:{}", i, digest(i))).collect();
    println!(
        "Writer: Precomputed {} hashes in {:.2?}",
        count,
        start_precompute.elapsed()
    );

    let registry = RingSetRegistry::new();
    let set = RingSetBuilder::new()
        .with_host(Host::SharedMemory)
        .build_in(&registry, name)?;

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    let set_for_handler = Arc::clone(&set);

    // Handle Ctrl+C to clean up
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
        set_for_handler.interrupt();
    })?;

    let mut writer = set.open_writer(0)?;
    println!("Writer: Created ring set {} ({:?})", name, set.geometry());

    let start_send = Instant::now();
    for message in &messages {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        writer.write_plain(message.as_bytes());
    }
    let send_time = start_send.elapsed();
    let produced = set.stats(0).map(|s| s.produced).unwrap_or(0);
    println!("Writer: Wrote {} messages in {:.2?}", produced, send_time);
    println!(
        "Writer: Throughput: {:.2} messages/sec",
        produced as f64 / send_time.as_secs_f64()
    );

    if auto_exit {
        println!("Writer: Auto-exit mode, waiting 2 seconds for readers...");
        std::thread::sleep(Duration::from_secs(2));
    } else {
        println!("Press Ctrl+C to exit...");
        while running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    println!("Writer: Shutting down");
    writer.close();
    if let Err(e) = registry.teardown(name) {
        eprintln!("Writer: Teardown of {} failed: {}", name, e);
    }
    Ok(())
}

fn read(name: &str) -> Result<(), Box<dyn Error>> {
    let registry = RingSetRegistry::new();
    let set = registry.attach(name)?;

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    let set_for_handler = Arc::clone(&set);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
        set_for_handler.interrupt();
    })?;

    let mut reader = set.open_reader(RingId::All)?;
    println!("Reader: Attached to {}, waiting for messages...", name);

    let mut verified = 0u64;
    let mut corrupt = 0u64;
    while running.load(Ordering::SeqCst) {
        let Some(message) = reader.next_wait(Some(Duration::from_millis(500))) else {
            continue;
        };
        let Message::Plain(plain) = message else {
            continue;
        };
        let text = String::from_utf8_lossy(plain.bytes);
        let ok = text
            .split_once(':')
            .and_then(|(i, hash)| i.parse::<usize>().ok().map(|i| digest(i) == hash))
            .unwrap_or(false);
        if ok {
            verified += 1;
        } else {
            corrupt += 1;
            eprintln!("Reader: Corrupt message: {}", text);
        }
        if (verified + corrupt) % 1000 == 0 {
            println!("Reader: {} verified, {} skipped", verified, reader.skips());
        }
    }

    println!(
        "Reader: Done. {} verified, {} corrupt, {} skipped",
        verified,
        corrupt,
        reader.skips()
    );
    reader.close();
    Ok(())
}
