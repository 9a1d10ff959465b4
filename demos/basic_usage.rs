//! Basic usage example for the L2 book reconstructor.
//!
//! Run with: RUST_LOG=debug cargo run --example basic_usage

use l2_book_reconstructor::{
    EngineConfig, MarketEvent, RawRecord, ReconstructionEngine, ReplayMarketView, MarketDataView,
    Side,
};

fn print_events(events: &[MarketEvent]) {
    for event in events {
        match event {
            MarketEvent::Trade(t) => println!(
                "  -> TRADE {} @ ${:.2} (aggressor {:?}, resting order {})",
                t.volume,
                t.price_f64(),
                t.aggressor_side,
                t.resting_order_id
            ),
            MarketEvent::Update(u) => println!(
                "  -> UPDATE {:?} ${:.2} now {} shares",
                u.side,
                u.price_f64(),
                u.volume
            ),
            MarketEvent::Snapshot(s) => println!(
                "  -> SNAPSHOT {} bid levels / {} ask levels",
                s.bids.len(),
                s.asks.len()
            ),
        }
    }
}

fn main() {
    env_logger::init();

    println!("=================================================================");
    println!("L2 Book Reconstructor - Basic Usage Example");
    println!("=================================================================\n");

    let mut engine = ReconstructionEngine::new(EngineConfig::new(10))
        .expect("default depth-10 config is valid");
    println!("✓ Created engine (10 levels)\n");

    let records = vec![
        RawRecord::add("AAPL", 1, 1001, Side::Buy, 100.00, 100).with_sequence(1),
        RawRecord::add("AAPL", 2, 2001, Side::Sell, 100.01, 200).with_sequence(2),
        RawRecord::add("AAPL", 3, 1002, Side::Buy, 99.99, 150).with_sequence(3),
        // Partial fill: 50 of 100 at the resting price
        RawRecord::trade("AAPL", 4, 1001, 50, None).with_sequence(4),
        RawRecord::cancel("AAPL", 5, 1002, None).with_sequence(5),
        // Delivered twice, second copy is a no-op
        RawRecord::cancel("AAPL", 5, 1002, None).with_sequence(5),
    ];

    let mut all_events = Vec::new();
    for (i, raw) in records.iter().enumerate() {
        println!(
            "Record {}: {} order {:?}",
            i + 1,
            raw.event.as_deref().unwrap_or("?"),
            raw.order_id
        );
        match engine.process(raw) {
            Ok(events) if events.is_empty() => println!("  -> (no-op)"),
            Ok(events) => {
                print_events(&events);
                all_events.extend(events);
            }
            Err(err) => println!("  -> error: {err}"),
        }
    }

    println!("\n=================================================================");
    println!("Final Book");
    println!("=================================================================\n");

    let snapshot = engine.snapshot("AAPL", None).expect("AAPL was processed");

    println!("Bid Side:");
    for (i, (price, volume)) in snapshot.ladder(Side::Buy).into_iter().enumerate() {
        println!("  Level {}: ${:.2} x {} shares", i + 1, price, volume);
    }
    println!("\nAsk Side:");
    for (i, (price, volume)) in snapshot.ladder(Side::Sell).into_iter().enumerate() {
        println!("  Level {}: ${:.2} x {} shares", i + 1, price, volume);
    }

    // Rebuild the same ladders downstream from the event stream alone
    let mut view = ReplayMarketView::new(all_events);
    view.advance(i64::MAX);
    if let Some(features) = view.current_features("AAPL") {
        println!("\nDownstream view:");
        if let Some(mid) = features.mid_price {
            println!("  Mid-price: ${:.4}", mid);
        }
        if let Some(spread_bps) = features.spread_bps {
            println!("  Spread (bps): {:.2}", spread_bps);
        }
        if let Some(last) = features.last_trade_price {
            println!("  Last trade: ${:.2}", last);
        }
    }

    let stats = engine.symbol_stats("AAPL").expect("AAPL was processed");
    println!("\nStatistics:");
    println!("  Commands applied: {}", stats.commands_applied);
    println!("  Duplicates: {}", stats.duplicates);
    println!("  Trades: {}", stats.trades);

    println!("\n✓ Example complete!");
}
