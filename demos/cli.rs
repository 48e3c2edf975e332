//! Interactive console for a DLZ Creator
//!
//! ```text
//! DLZ_HOST=192.168.1.20 DLZ_LOG=debug cargo run --example cli
//! ```
//!
//! Commands: `play <bank><pad>`, `stop <bank><pad>`, `pads`, `quit`.

use dlz_creator::{ClientConfig, PadControl, PadId, BANK_COUNT, PADS_PER_BANK};
use std::io::{self, BufRead, Write};
use tracing::Level;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let level = std::env::var("DLZ_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let host = std::env::var("DLZ_HOST").unwrap_or_else(|_| "localhost".to_string());
    let mut control = PadControl::start(ClientConfig::new(host))?;

    let mut events = control.subscribe();
    control.set_observer(|| tracing::debug!("Pads changed"));

    println!("Commands: play <bank><pad>, stop <bank><pad>, pads, quit");
    print_prompt()?;

    for line in io::stdin().lock().lines() {
        while let Ok(Some(event)) = events.try_recv() {
            println!("* {:?}", event);
        }

        let line = line?;
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("play"), Some(slot)) => trigger(&control, slot, true),
            (Some("stop"), Some(slot)) => trigger(&control, slot, false),
            (Some("pads"), None) => print_pads(&control),
            (Some("quit" | "exit"), None) => break,
            (None, _) => {}
            _ => println!("Unknown command: {}", line.trim()),
        }
        print_prompt()?;
    }

    control.disconnect();
    Ok(())
}

fn print_prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}

/// `"04"` is bank 0, pad 4
fn parse_slot(slot: &str) -> Option<PadId> {
    let digits: Vec<u8> = slot
        .chars()
        .map(|c| c.to_digit(10).map(|d| d as u8))
        .collect::<Option<_>>()?;
    match digits[..] {
        [bank, index] => PadId::new(bank, index),
        _ => None,
    }
}

fn trigger(control: &PadControl, slot: &str, play: bool) {
    let Some(id) = parse_slot(slot) else {
        println!(
            "Expected <bank><pad> with bank 0-{} and pad 0-{}",
            BANK_COUNT - 1,
            PADS_PER_BANK - 1
        );
        return;
    };

    let label = control
        .find_pad(id)
        .map_or_else(|| format!("B{}.P{}", id.bank, id.index), |pad| pad.label());

    let sent = if play {
        control.bridge().play_blocking(id)
    } else {
        control.bridge().stop_blocking(id)
    };
    let verb = if play { "play" } else { "stop" };
    if sent {
        println!("Sent {} to {}", verb, label);
    } else {
        println!("Could not {} {} (connected: {})", verb, label, control.is_connected());
    }
}

fn print_pads(control: &PadControl) {
    let pads = control.pads();
    if pads.is_empty() {
        println!("No pads loaded (connected: {})", control.is_connected());
        return;
    }

    for bank in 0..BANK_COUNT {
        let in_bank: Vec<_> = pads.iter().filter(|p| p.bank == bank).collect();
        if in_bank.is_empty() {
            continue;
        }
        println!("Bank {}:", bank);
        for pad in in_bank {
            let marker = if pad.is_playing() { ">" } else { " " };
            println!(
                "  {} {}{} {:<24} state={} pos={:.1}s",
                marker, pad.bank, pad.index, pad.name, pad.state, pad.curtime
            );
        }
    }
}
