//! Multi-symbol processing example.
//!
//! Demonstrates per-symbol fault isolation, gap recovery from a snapshot,
//! and parallel processing with the shared engine.
//!
//! Run with: RUST_LOG=info cargo run --example multi_symbol

use l2_book_reconstructor::{
    EngineConfig, OrderSnapshot, RawRecord, ReconstructionEngine, RestingOrder, SharedEngine, Side,
};

fn quotes(symbol: &str, bid: f64, ask: f64) -> Vec<RawRecord> {
    vec![
        RawRecord::add(symbol, 1, 1, Side::Buy, bid, 100).with_sequence(1),
        RawRecord::add(symbol, 2, 2, Side::Sell, ask, 150).with_sequence(2),
        RawRecord::add(symbol, 3, 3, Side::Buy, bid - 0.01, 80).with_sequence(3),
    ]
}

fn main() {
    env_logger::init();

    println!("=================================================================");
    println!("L2 Book Reconstructor - Multi-Symbol Example");
    println!("=================================================================\n");

    let mut engine = ReconstructionEngine::new(EngineConfig::new(10)).unwrap();
    println!("✓ Created engine (10 levels per symbol)\n");

    // Interleave three symbols; TSLA gets a record it cannot apply
    let mut records = Vec::new();
    let symbols = [
        ("NVDA", 140.00, 140.01),
        ("TSLA", 250.00, 250.02),
        ("AAPL", 180.00, 180.01),
    ];
    for (symbol, bid, ask) in symbols {
        records.extend(quotes(symbol, bid, ask));
    }
    records.push(RawRecord::trade("TSLA", 4, 2, 1_000, None).with_sequence(4));
    records.push(RawRecord::trade("NVDA", 4, 2, 50, None).with_sequence(4));

    println!("Replaying {} records...", records.len());
    let report = engine.replay(records);
    println!("  ✓ {} events emitted", report.events.len());
    for fault in &report.faults {
        println!("  ✗ {} faulted: {}", fault.symbol, fault.error);
    }
    println!();

    // AAPL misses sequence 4 and recovers from a snapshot
    println!("Simulating a gap on AAPL...");
    let _ = engine.process(&RawRecord::cancel("AAPL", 6, 1, None).with_sequence(5));
    println!("  lifecycle: {:?}", engine.lifecycle("AAPL").unwrap());
    let snapshot = OrderSnapshot {
        sequence: 4,
        ts: 5,
        orders: vec![
            RestingOrder { order_id: 1, side: Side::Buy, price: 180.00, volume: 100 },
            RestingOrder { order_id: 2, side: Side::Sell, price: 180.01, volume: 150 },
        ],
    };
    let load = engine.load_snapshot("AAPL", &snapshot).unwrap();
    println!(
        "  ✓ snapshot loaded, {} buffered record(s) replayed, lifecycle: {:?}\n",
        load.replayed,
        engine.lifecycle("AAPL").unwrap()
    );

    // TSLA needs an explicit reset
    engine.reset("TSLA").unwrap();
    println!("✓ Reset TSLA: {:?}\n", engine.lifecycle("TSLA").unwrap());

    println!("=================================================================");
    println!("Current Books");
    println!("=================================================================\n");

    for snapshot in engine.snapshot_all(None) {
        println!("{}:", snapshot.symbol);
        match (snapshot.best_bid(), snapshot.best_ask()) {
            (Some(bid), Some(ask)) => println!(
                "  Best bid: ${:.2} x {}  Best ask: ${:.2} x {}",
                bid.price_f64(),
                bid.volume,
                ask.price_f64(),
                ask.volume
            ),
            _ => println!("  (one-sided or empty)"),
        }
        let stats = engine.symbol_stats(&snapshot.symbol).unwrap();
        println!("  Commands applied: {}", stats.commands_applied);
        println!();
    }

    let stats = engine.stats();
    println!("Total symbols: {}", stats.symbol_count);
    println!("Total records: {}", stats.total_records);
    println!("Errors: {}", stats.errors);

    let mut per_symbol: Vec<_> = stats.records_per_symbol.iter().collect();
    per_symbol.sort_by_key(|(sym, _)| *sym);
    for (symbol, count) in per_symbol {
        println!("  {}: {}", symbol, count);
    }

    println!("\n=================================================================");
    println!("Parallel Processing");
    println!("=================================================================\n");

    let shared = SharedEngine::new(EngineConfig::new(10)).unwrap();
    let names = ["NVDA", "TSLA", "AAPL"];
    let batches = vec![
        quotes("NVDA", 140.00, 140.01),
        quotes("TSLA", 250.00, 250.02),
        quotes("AAPL", 180.00, 180.01),
    ];
    let results = shared.process_parallel(batches);
    for (symbol, result) in names.iter().zip(&results) {
        println!("  {}: {:?}", symbol, result.as_ref().map(Vec::len));
    }

    println!("\n✓ Multi-symbol example complete!");
}
