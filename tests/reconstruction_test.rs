//! End-to-end reconstruction tests over generated order flow.
//!
//! The generator below produces realistic add / partial cancel / full cancel
//! / trade sequences that never reference unknown orders, so every record is
//! expected to apply cleanly unless a test corrupts the stream on purpose.
//!
//! Run with:
//! ```bash
//! cargo test --test reconstruction_test
//! ```

use std::sync::Arc;

use l2_book_reconstructor::{
    fixed_to_price, BookLifecycle, EngineConfig, InMemoryManifest, JsonFileManifest, MarketDataView,
    MarketEvent, NormalizationMode, OrderSnapshot, ProgressManifest, RawRecord,
    ReconError, ReconstructionEngine, RecoveryCause, ReplayMarketView, RestingOrder, SharedEngine,
    Side, SnapshotCadence, SourceMetadata, SymbolReconstructor, VecSource, WarningCategory,
};

// ============================================================================
// Helpers
// ============================================================================

/// Deterministic LCG so streams are reproducible without extra dependencies.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// Generate `n` sequenced records for one symbol.
fn generate_stream(symbol: &str, n: u64, seed: u64) -> Vec<RawRecord> {
    let mut rng = Lcg(seed);
    let mut resting: Vec<(i64, i64)> = Vec::new();
    let mut next_id = 1i64;
    let mut records = Vec::with_capacity(n as usize);

    for seq in 1..=n {
        let ts = seq as i64 * 1_000;
        let roll = rng.below(10);

        let record = if resting.is_empty() || roll < 5 {
            let side = if rng.below(2) == 0 { Side::Buy } else { Side::Sell };
            let tick = rng.below(10) as f64 * 0.01;
            let price = match side {
                Side::Buy => 99.95 - tick,
                Side::Sell => 100.05 + tick,
            };
            let volume = (rng.below(20) as i64 + 1) * 10;
            resting.push((next_id, volume));
            next_id += 1;
            RawRecord::add(symbol, ts, next_id - 1, side, price, volume)
        } else {
            let idx = rng.below(resting.len() as u64) as usize;
            let (order_id, remaining) = resting[idx];

            if roll < 8 {
                if remaining > 1 && rng.below(2) == 0 {
                    let volume = 1 + rng.below(remaining as u64 - 1) as i64;
                    resting[idx].1 -= volume;
                    RawRecord::cancel(symbol, ts, order_id, Some(volume))
                } else {
                    resting.swap_remove(idx);
                    RawRecord::cancel(symbol, ts, order_id, None)
                }
            } else {
                let volume = 1 + rng.below(remaining as u64) as i64;
                if volume == remaining {
                    resting.swap_remove(idx);
                } else {
                    resting[idx].1 -= volume;
                }
                RawRecord::trade(symbol, ts, order_id, volume, None)
            }
        };

        records.push(record.with_sequence(seq));
    }

    records
}

fn quiet_config() -> EngineConfig {
    EngineConfig::new(0).with_logging(false)
}

fn engine() -> ReconstructionEngine {
    ReconstructionEngine::new(quiet_config()).unwrap()
}

/// Order-level snapshot of a reconstructor's current book, FIFO preserved.
fn order_snapshot(recon: &SymbolReconstructor, sequence: u64, ts: i64) -> OrderSnapshot {
    let mut orders = Vec::new();
    for side in [Side::Buy, Side::Sell] {
        for level in recon.book().ledger().levels(side) {
            for (order_id, volume) in level.iter() {
                orders.push(RestingOrder {
                    order_id,
                    side,
                    price: fixed_to_price(level.price()),
                    volume,
                });
            }
        }
    }
    OrderSnapshot {
        sequence,
        ts,
        orders,
    }
}

/// Ladders plus every level's FIFO queue, for exact book comparison.
fn book_fingerprint(recon: &SymbolReconstructor) -> Vec<(Side, i64, u64, Vec<u64>)> {
    let mut out = Vec::new();
    for side in [Side::Buy, Side::Sell] {
        for level in recon.book().ledger().levels(side) {
            out.push((side, level.price(), level.aggregate_volume(), level.order_ids()));
        }
    }
    out
}

// ============================================================================
// Test: Reference scenario
// ============================================================================

#[test]
fn test_reference_scenario() {
    let mut engine = engine();

    engine
        .process(&RawRecord::add("AAPL", 1, 1, Side::Buy, 10.0, 100))
        .unwrap();
    assert_eq!(
        engine.snapshot("AAPL", None).unwrap().ladder(Side::Buy),
        vec![(10.0, 100)]
    );

    engine
        .process(&RawRecord::add("AAPL", 2, 2, Side::Buy, 10.0, 50))
        .unwrap();
    assert_eq!(
        engine.snapshot("AAPL", None).unwrap().ladder(Side::Buy),
        vec![(10.0, 150)]
    );

    let events = engine
        .process(&RawRecord::trade("AAPL", 3, 1, 60, Some(10.0)))
        .unwrap();
    let trade = events[0].as_trade().unwrap();
    assert_eq!(trade.price_f64(), 10.0);
    assert_eq!(trade.volume, 60);
    assert_eq!(trade.aggressor_side, Side::Sell);
    assert_eq!(
        engine
            .get("AAPL")
            .unwrap()
            .book()
            .order(1)
            .unwrap()
            .remaining_volume,
        40
    );
    assert_eq!(
        engine.snapshot("AAPL", None).unwrap().ladder(Side::Buy),
        vec![(10.0, 90)]
    );

    engine
        .process(&RawRecord::cancel("AAPL", 4, 2, None))
        .unwrap();
    let snapshot = engine.snapshot("AAPL", None).unwrap();
    assert_eq!(snapshot.ladder(Side::Buy), vec![(10.0, 40)]);
    assert_eq!(snapshot.last_price, Some(10_000_000_000));
}

// ============================================================================
// Test: Invariants over generated flow
// ============================================================================

#[test]
fn test_aggregate_invariant_holds_throughout() {
    let mut recon = SymbolReconstructor::with_config("AAPL", Arc::new(quiet_config()));

    for raw in generate_stream("AAPL", 5_000, 7) {
        recon.process(&raw).unwrap();
        recon.verify_invariants().unwrap();
    }

    let stats = recon.stats();
    assert_eq!(stats.commands_applied, 5_000);
    assert_eq!(stats.orders_not_found, 0);
    assert!(stats.trades > 0 && stats.cancels > 0);
}

#[test]
fn test_determinism_across_replays() {
    let stream = generate_stream("AAPL", 3_000, 42);

    let mut first = engine();
    let mut second = engine();
    let events_a = first.apply_all(&stream).unwrap();
    let events_b = second.apply_all(&stream).unwrap();

    assert_eq!(events_a, events_b);
    assert_eq!(
        first.snapshot("AAPL", None).unwrap(),
        second.snapshot("AAPL", None).unwrap()
    );
    assert_eq!(
        book_fingerprint(first.get("AAPL").unwrap()),
        book_fingerprint(second.get("AAPL").unwrap())
    );
}

#[test]
fn test_duplicate_delivery_is_idempotent() {
    let stream = generate_stream("AAPL", 1_000, 3);

    let mut clean = engine();
    clean.apply_all(&stream).unwrap();

    // Every record delivered twice
    let mut doubled = engine();
    for raw in &stream {
        doubled.process(raw).unwrap();
        assert!(doubled.process(raw).unwrap().is_empty());
    }

    assert_eq!(
        book_fingerprint(clean.get("AAPL").unwrap()),
        book_fingerprint(doubled.get("AAPL").unwrap())
    );
    assert_eq!(doubled.symbol_stats("AAPL").unwrap().duplicates, 1_000);
}

#[test]
fn test_full_cancel_of_last_order_removes_level() {
    let mut engine = engine();
    engine
        .process(&RawRecord::add("AAPL", 1, 1, Side::Sell, 10.5, 30))
        .unwrap();
    engine
        .process(&RawRecord::add("AAPL", 2, 2, Side::Sell, 10.6, 30))
        .unwrap();

    let events = engine
        .process(&RawRecord::cancel("AAPL", 3, 1, None))
        .unwrap();
    let update = events[0].as_update().unwrap();
    assert!(update.is_removal());
    assert_eq!(update.price_f64(), 10.5);

    let snapshot = engine.snapshot("AAPL", None).unwrap();
    assert_eq!(snapshot.ladder(Side::Sell), vec![(10.6, 30)]);
}

#[test]
fn test_trade_exceeding_remaining_is_fatal() {
    let mut engine = engine();
    engine
        .process(&RawRecord::add("AAPL", 1, 1, Side::Buy, 10.0, 100))
        .unwrap();

    let err = engine
        .process(&RawRecord::trade("AAPL", 2, 1, 101, None))
        .unwrap_err();
    assert!(matches!(err, ReconError::InvariantViolation(_)));
    assert!(err.is_fatal());
    assert_eq!(
        engine.lifecycle("AAPL"),
        Some(BookLifecycle::Recovering(RecoveryCause::Fault))
    );

    // Explicit reset resumes streaming from cold
    engine.reset("AAPL").unwrap();
    engine
        .process(&RawRecord::add("AAPL", 3, 1, Side::Buy, 10.0, 5))
        .unwrap();
    assert_eq!(engine.lifecycle("AAPL"), Some(BookLifecycle::Streaming));
    assert_eq!(
        engine.snapshot("AAPL", None).unwrap().ladder(Side::Buy),
        vec![(10.0, 5)]
    );
}

// ============================================================================
// Test: Fault isolation and recovery
// ============================================================================

#[test]
fn test_fault_is_scoped_to_symbol() {
    let mut engine = engine();
    let aapl = generate_stream("AAPL", 500, 11);
    let msft = generate_stream("MSFT", 500, 12);

    // Interleave, corrupting AAPL half way through
    for (i, (a, m)) in aapl.iter().zip(&msft).enumerate() {
        if i == 250 {
            let mut broken = a.clone();
            broken.volume = Some(-5);
            broken.event = Some("add".to_string());
            broken.side = Some("B".to_string());
            broken.price = Some(10.0);
            assert!(engine.process(&broken).is_err());
        } else {
            let _ = engine.process(a);
        }
        engine.process(m).unwrap();
    }

    assert!(engine.lifecycle("AAPL").unwrap().is_faulted());
    assert_eq!(engine.lifecycle("MSFT"), Some(BookLifecycle::Streaming));
    assert_eq!(engine.symbol_stats("MSFT").unwrap().commands_applied, 500);
    assert_eq!(engine.symbol_stats("AAPL").unwrap().rejected, 249);
}

#[test]
fn test_gap_recovery_matches_uninterrupted_replay() {
    let stream = generate_stream("AAPL", 2_000, 99);
    let gap_at = 1_200usize;

    // Reference replays everything, capturing an order-level snapshot at the gap
    let mut reference = SymbolReconstructor::with_config("AAPL", Arc::new(quiet_config()));
    let mut recovery_snapshot = None;
    for (i, raw) in stream.iter().enumerate() {
        reference.process(raw).unwrap();
        if i + 1 == gap_at {
            recovery_snapshot = Some(order_snapshot(&reference, raw.sequence.unwrap(), raw.ts.unwrap()));
        }
    }
    let recovery_snapshot = recovery_snapshot.unwrap();

    // Recovering replica loses the record at the gap
    let mut replica = SymbolReconstructor::with_config("AAPL", Arc::new(quiet_config()));
    for (i, raw) in stream.iter().enumerate() {
        if i + 1 == gap_at {
            continue;
        }
        let result = replica.process(raw);
        if i == gap_at {
            assert!(matches!(result, Err(ReconError::SequenceGap { .. })));
            assert_eq!(
                replica.lifecycle(),
                BookLifecycle::Recovering(RecoveryCause::SequenceGap)
            );
        } else {
            assert!(result.is_ok());
        }
    }
    assert_eq!(replica.buffered_len(), stream.len() - gap_at);

    let load = replica.load_snapshot(&recovery_snapshot).unwrap();
    assert!(load.fault.is_none());
    assert_eq!(load.replayed, stream.len() - gap_at);
    assert!(matches!(load.events.first(), Some(MarketEvent::Snapshot(_))));
    assert_eq!(replica.lifecycle(), BookLifecycle::Streaming);

    assert_eq!(book_fingerprint(&replica), book_fingerprint(&reference));
    assert_eq!(replica.last_sequence(), reference.last_sequence());
    replica.verify_invariants().unwrap();
}

// ============================================================================
// Test: Normalization modes
// ============================================================================

#[test]
fn test_strict_versus_lenient() {
    let clean = generate_stream("AAPL", 400, 5);

    // Same records with junk spliced in every 50th position, renumbered
    let mut dirty = Vec::new();
    for (i, raw) in clean.iter().enumerate() {
        if i % 50 == 25 {
            dirty.push(RawRecord::cancel("AAPL", raw.ts.unwrap(), 1, None).with_event("modify"));
            let mut missing = raw.clone();
            missing.ts = None;
            dirty.push(missing.with_event("trade"));
        }
        dirty.push(raw.clone());
    }
    let renumber = |records: &[RawRecord]| -> Vec<RawRecord> {
        records
            .iter()
            .enumerate()
            .map(|(i, r)| r.clone().with_sequence(i as u64 + 1))
            .collect()
    };
    let clean = renumber(&clean);
    let dirty = renumber(&dirty);

    let mut strict = engine();
    let result = strict.apply_all(&dirty);
    assert!(matches!(result, Err(ReconError::UnknownMessageType { .. })));
    assert!(strict.lifecycle("AAPL").unwrap().is_faulted());

    let mut lenient =
        ReconstructionEngine::new(quiet_config().with_mode(NormalizationMode::Lenient)).unwrap();
    lenient.apply_all(&dirty).unwrap();

    let mut reference = engine();
    reference.apply_all(&clean).unwrap();

    assert_eq!(
        book_fingerprint(lenient.get("AAPL").unwrap()),
        book_fingerprint(reference.get("AAPL").unwrap())
    );
    let stats = lenient.symbol_stats("AAPL").unwrap();
    assert_eq!(stats.unknown_dropped, 8);
    assert_eq!(stats.malformed_dropped, 8);
    assert_eq!(stats.gaps, 0);
}

// ============================================================================
// Test: Event stream consumers
// ============================================================================

#[test]
fn test_update_events_rebuild_ladders() {
    let mut engine = engine();
    let mut events = Vec::new();
    for symbol in ["AAPL", "MSFT"] {
        events.extend(
            engine
                .apply_all(&generate_stream(symbol, 1_500, symbol.len() as u64))
                .unwrap(),
        );
    }

    let mut view = ReplayMarketView::new(events);
    view.advance(i64::MAX);
    assert!(view.is_exhausted());

    for symbol in ["AAPL", "MSFT"] {
        let snapshot = engine.snapshot(symbol, None).unwrap();
        assert_eq!(view.levels(symbol, Side::Buy), snapshot.bids);
        assert_eq!(view.levels(symbol, Side::Sell), snapshot.asks);

        let features = view.current_features(symbol).unwrap();
        assert_eq!(
            features.best_bid,
            snapshot.best_bid().map(|l| l.price_f64())
        );
        assert_eq!(
            view.current_price(symbol),
            snapshot
                .last_price
                .map(fixed_to_price)
                .or(features.mid_price)
        );
    }
}

#[test]
fn test_periodic_snapshots_follow_cadence() {
    let config = quiet_config().with_snapshot_cadence(SnapshotCadence::EveryCommands(100));
    let mut engine = ReconstructionEngine::new(config).unwrap();
    let events = engine
        .apply_all(&generate_stream("AAPL", 1_000, 21))
        .unwrap();

    let snapshots: Vec<_> = events.iter().filter_map(MarketEvent::as_snapshot).collect();
    assert_eq!(snapshots.len(), 10);
    assert_eq!(snapshots.last().unwrap().sequence, 1_000);
    assert_eq!(
        snapshots.last().unwrap().bids,
        engine.snapshot("AAPL", None).unwrap().bids
    );
}

// ============================================================================
// Test: Concurrency
// ============================================================================

#[test]
fn test_shared_engine_matches_single_threaded() {
    let symbols = ["AAPL", "AMZN", "MSFT", "NVDA", "TSLA", "META"];
    let batches: Vec<Vec<RawRecord>> = symbols
        .iter()
        .enumerate()
        .map(|(i, s)| generate_stream(s, 2_000, 1_000 + i as u64))
        .collect();

    let shared = SharedEngine::new(quiet_config()).unwrap();
    let results = shared.process_parallel(batches.clone());
    assert!(results.iter().all(Result::is_ok));

    let mut sequential = engine();
    for batch in &batches {
        sequential.apply_all(batch).unwrap();
    }

    for symbol in symbols {
        assert_eq!(
            shared.snapshot(symbol, None).unwrap(),
            sequential.snapshot(symbol, None).unwrap()
        );
    }
}

// ============================================================================
// Test: Progress manifest and warnings
// ============================================================================

#[test]
fn test_manifest_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("progress.json");
    let source = || {
        VecSource::new(generate_stream("AAPL", 200, 8))
            .with_metadata(SourceMetadata::from_path("/data/AAPL_2025-02-03.jsonl"))
    };

    {
        let manifest = JsonFileManifest::open(&manifest_path).unwrap();
        let mut engine = engine();
        let report = engine
            .run_source_tracked(source(), &manifest)
            .unwrap()
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.records, 200);
    }

    let manifest = JsonFileManifest::open(&manifest_path).unwrap();
    assert!(manifest.is_done("/data/AAPL_2025-02-03.jsonl"));
    let mut engine = engine();
    assert!(engine
        .run_source_tracked(source(), &manifest)
        .unwrap()
        .is_none());
    assert!(!engine.has_symbol("AAPL"));

    // A fresh in-memory manifest knows nothing
    let memory = InMemoryManifest::new();
    assert!(engine
        .run_source_tracked(source(), &memory)
        .unwrap()
        .is_some());
}

#[test]
fn test_unpersisted_mark_does_not_skip_source() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("progress.json");
    let source = || {
        VecSource::new(generate_stream("MSFT", 100, 9))
            .with_metadata(SourceMetadata::from_path("/data/MSFT_2025-02-04.jsonl"))
    };
    let manifest = JsonFileManifest::open(&manifest_path).unwrap();

    // Manifest directory cannot take the write
    let blocker = manifest_path.with_extension("tmp");
    std::fs::create_dir(&blocker).unwrap();
    let mut engine = engine();
    assert!(engine.run_source_tracked(source(), &manifest).is_err());
    assert!(!manifest.is_done("/data/MSFT_2025-02-04.jsonl"));

    // Same process, storage back: the source runs again and sticks
    std::fs::remove_dir(&blocker).unwrap();
    let mut engine = self::engine();
    let report = engine
        .run_source_tracked(source(), &manifest)
        .unwrap()
        .unwrap();
    assert!(report.is_clean());
    assert!(manifest.is_done("/data/MSFT_2025-02-04.jsonl"));
}

#[test]
fn test_warnings_export() {
    let mut engine = engine();
    engine
        .process(&RawRecord::cancel("AAPL", 1, 404, None))
        .unwrap();
    engine
        .process(&RawRecord::trade("AAPL", 2_000_000_000, 405, 1, None))
        .unwrap();

    let warnings = engine.get("AAPL").unwrap().warnings();
    assert_eq!(warnings.count_by_category(WarningCategory::OrderNotFound), 2);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warnings.json");
    warnings.export_to_file(&path).unwrap();

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(exported["summary"]["total"], 2);
    assert_eq!(exported["warnings"].as_array().unwrap().len(), 2);
}

#[test]
fn test_config_file_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    quiet_config()
        .with_mode(NormalizationMode::Lenient)
        .save_json(&path)
        .unwrap();

    let config = EngineConfig::load_json(&path).unwrap();
    let mut engine = ReconstructionEngine::new(config).unwrap();
    assert!(engine
        .process(&RawRecord::new("AAPL").with_event("??"))
        .unwrap()
        .is_empty());
    assert_eq!(engine.symbol_stats("AAPL").unwrap().unknown_dropped, 1);
}
