use std::time::{Duration, Instant};

use bbio_drivers::{Board, Interrupt};
use colored::Colorize;
use crossbeam::channel::{self, select};

use crate::stop;

/// How often the main loop looks at the Ctrl-C flag
const STOP_CHECK: Duration = Duration::from_millis(100);

struct Edge {
    pin: &'static str,
    at: Instant,
}

pub fn run(board: &Board, pins: &[String]) -> anyhow::Result<()> {
    stop::install();
    let (edges_tx, edges_rx) = channel::unbounded();

    let mut interrupts = Vec::with_capacity(pins.len());
    for pin in pins {
        let mut irq = Interrupt::init(board, pin)?;
        let key = irq.gpio().pin().key();
        let tx = edges_tx.clone();
        irq.attach(move || {
            // The receiver outlives every interrupt
            let _ = tx.send(Edge {
                pin: key,
                at: Instant::now(),
            });
        })?;

        println!(
            "{} Watching {} (bit {}, {:?} delivery)",
            "👀".cyan(),
            key.bold(),
            irq.bit().index(),
            irq.delivery()
        );
        interrupts.push(irq);
    }
    drop(edges_tx);

    let started = Instant::now();
    let ticker = channel::tick(STOP_CHECK);
    let mut count = 0u64;

    while !stop::requested() {
        select! {
            recv(edges_rx) -> edge => match edge {
                Ok(edge) => {
                    count += 1;
                    println!(
                        "  [{:>9.3}s] edge on {}",
                        edge.at.duration_since(started).as_secs_f64(),
                        edge.pin.bold()
                    );
                }
                Err(_) => break,
            },
            recv(ticker) -> _ => {}
        }
    }

    for irq in interrupts {
        irq.free()?;
    }
    println!("{} {} edges seen", "✓".green(), count);
    Ok(())
}
