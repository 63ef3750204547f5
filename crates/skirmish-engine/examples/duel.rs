//! A headless duel: a hero whittles down a poisoned ogre in real time.
//!
//! Demonstrates the full loop surface: registration, buffs, intents, the
//! frame listener, and wall-clock driving via `advance`.
//!
//! Run with: `cargo run --example duel`

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use skirmish_engine::prelude::*;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut engine = FrameLoop::new(SchedulerConfig::default(), 0xC0FFEE);

    let hero = engine.register_member(
        EntityDefinition {
            id: "hero".to_owned(),
            name: "Hero".to_owned(),
            kind: "character".to_owned(),
            source_attributes: BTreeMap::from([
                ("strength".to_owned(), 18.0),
                ("vitality".to_owned(), 14.0),
            ]),
        },
        None,
    )?;
    let ogre = engine.register_member(
        EntityDefinition {
            id: "ogre".to_owned(),
            name: "Ogre".to_owned(),
            kind: "monster".to_owned(),
            source_attributes: BTreeMap::from([
                ("base_hp".to_owned(), 600.0),
                ("base_physical_atk".to_owned(), 35.0),
            ]),
        },
        None,
    )?;

    // A poison that ticks every 30 frames for 300 frames, scaling with the
    // ogre's own attack.
    let poison = BuffData {
        id: "venom".to_owned(),
        kind: "debuff".to_owned(),
        duration: 300,
        attribute_modifiers: vec![AttributeModifier {
            attribute: "physical_atk".to_owned(),
            value: 0.8,
            op: ModifierOp::Multiply,
        }],
        periodic: Some(PeriodicEffect {
            interval: 30,
            expression: "target.physical_atk / 2 + irandom(1, 6)".to_owned(),
            kind: PeriodicKind::Damage,
        }),
        stack_rule: StackRule::default(),
    };
    engine.apply_buff(&poison, ogre)?;

    engine.set_frame_listener(|report| {
        if report.frame % 60 == 0 && report.frame > 0 {
            tracing::info!(
                frame = report.frame,
                events = report.events_processed,
                us = report.processing_us,
                "second elapsed"
            );
        }
    });

    engine.start()?;
    let mut last = Instant::now();
    let mut next_swing = 60;
    loop {
        // A real host would sleep on vsync; the demo just spins the clock.
        std::thread::sleep(Duration::from_millis(8));
        let now = Instant::now();
        engine.advance(now - last);
        last = now;

        let frame = engine.current_frame();
        while frame >= next_swing {
            // One sword swing per simulated second.
            engine.enqueue_damage(ogre, 45, DamageType::Physical, hero)?;
            next_swing += 60;
        }

        let target = engine.member(ogre)?;
        if !target.context.is_alive {
            tracing::info!(frame, "the ogre falls");
            break;
        }
        if frame > 3_600 {
            tracing::info!(frame, hp = target.context.stats.hp, "the ogre endures");
            break;
        }
    }
    engine.stop()?;

    let stats = engine.telemetry_stats();
    tracing::info!(
        frames = stats.frames_recorded,
        avg_us = stats.avg_processing_us,
        effective_fps = stats.effective_fps,
        "duel finished"
    );
    Ok(())
}
