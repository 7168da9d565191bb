//! A storm with a party of three and three strangers nearby spawns a
//! high-tier event, and completing it pays by contribution.

use std::sync::{Arc, Mutex};

use stormcraft_core::body::BodyStatus;
use stormcraft_core::config::EngineConfig;
use stormcraft_core::difficulty::ThreatTier;
use stormcraft_core::event::EventType;
use stormcraft_core::geometry::{PlayerId, StormId};
use stormcraft_core::ports::Storm;
use stormcraft_difficulty::{DensityCache, DifficultyEngine, DifficultySettings};
use stormcraft_events::{CooldownLedger, EventRegistry, ObjectiveBodyFactory};
use stormcraft_rewards::{RewardEngine, RewardSettings};
use stormcraft_spawning::{Scheduler, SchedulerSettings, SpawnOutcome, TickReport};
use stormcraft_test_support::{
    ManualClock, RecordingEconomy, SequenceRng, StaticClaims, StaticPartySource, StaticStorms,
    StaticWorld, location,
};

struct Party {
    primary: PlayerId,
    friends: [PlayerId; 2],
    strangers: Vec<PlayerId>,
}

fn populate(world: &StaticWorld) -> Party {
    let primary = world.spawn(location(1.0, 64.0, 0.0));
    let friends = [
        world.spawn(location(5.0, 64.0, 0.0)),
        world.spawn(location(6.0, 64.0, 0.0)),
    ];
    let strangers = (0..3)
        .map(|i| world.spawn(location(10.0 + f64::from(i), 64.0, 0.0)))
        .collect();
    Party {
        primary,
        friends,
        strangers,
    }
}

#[test]
fn test_party_near_storm_spawns_high_tier_event_and_pays_by_contribution() {
    // Arrange
    let config = EngineConfig::default();
    let clock = Arc::new(ManualClock::default());
    let world = Arc::new(StaticWorld::new());
    let party = populate(&world);
    let storm_id = StormId::new_v4();
    let storms = Arc::new(StaticStorms::new(vec![Storm {
        id: storm_id,
        location: location(0.0, 64.0, 0.0),
        intensity: 60,
    }]));
    let parties =
        StaticPartySource::new(&[vec![party.primary, party.friends[0], party.friends[1]]]);

    let density = DensityCache::new(world.clone(), clock.clone(), &config.density)
        .with_party_source(Arc::new(parties));
    let difficulty = Arc::new(
        DifficultyEngine::new(
            DifficultySettings::from_config(&config.difficulty, config.density.scan_radius)
                .unwrap(),
            Arc::new(density),
            world.clone(),
        )
        .with_claims(Arc::new(StaticClaims::wilderness()))
        .with_storms(storms.clone()),
    );
    let economy = Arc::new(RecordingEconomy::new());
    let rewards = Arc::new(
        RewardEngine::new(RewardSettings::from_config(&config), difficulty.clone())
            .with_economy(economy.clone()),
    );
    let registry = EventRegistry::new(
        Arc::new(CooldownLedger::new()),
        clock.clone(),
        Some(rewards),
        std::time::Duration::from_secs(1),
    );
    // High row draw 20 lands on the guardian, then the core ring;
    // roll, angle, radius.
    let rng = SequenceRng::new(vec![20, 0]).with_floats(vec![0.1, 0.0, 0.5]);
    let scheduler = Scheduler::new(
        SchedulerSettings::from_config(&config).unwrap(),
        difficulty,
        registry.clone(),
        Arc::new(ObjectiveBodyFactory::new(config.events.clone())),
        storms,
        clock,
        Arc::new(Mutex::new(rng)),
    );

    // Act
    let report = scheduler.tick();

    // Assert: spawn
    let TickReport::Attempted { attempts } = &report else {
        panic!("expected attempts, got {report:?}");
    };
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].density, 6);
    let SpawnOutcome::Spawned(id) = attempts[0].outcome else {
        panic!("expected a spawn, got {:?}", attempts[0].outcome);
    };
    let snapshot = registry.get(id).unwrap();
    assert_eq!(snapshot.descriptor.event_type, EventType::TempestGuardian);
    assert_eq!(snapshot.descriptor.storm_id, Some(storm_id));
    let result = snapshot.descriptor.difficulty.unwrap();
    assert!((result.multiplier - 2.7).abs() < 1e-9);
    assert_eq!(result.tier, ThreatTier::High);
    assert_eq!(result.party_count, 2);
    assert_eq!(result.proximity_count, 3);
    assert!(!result.near_storm);
    assert_eq!(
        scheduler.tick(),
        TickReport::CoolingDown {
            remaining_secs: 60
        }
    );

    // Act: fight and win
    registry.record_contribution(id, party.primary, 60.0).unwrap();
    registry.record_contribution(id, party.friends[0], 30.0).unwrap();
    registry.record_contribution(id, party.friends[1], 10.0).unwrap();
    registry.add_participant(id, party.strangers[0]).unwrap();
    let status = registry.record_progress(id, 1).unwrap();

    // Assert: payouts scale by 1 + (2.7 - 1) x 2.5 = 5.25
    assert_eq!(status, BodyStatus::Completed);
    assert!(!registry.is_active(id));
    assert_eq!(economy.total_for(party.primary), 3150);
    assert_eq!(economy.total_for(party.friends[0]), 1575);
    assert_eq!(economy.total_for(party.friends[1]), 525);
    assert_eq!(economy.total_for(party.strangers[0]), 10);
    assert_eq!(economy.total_for(party.strangers[1]), 0);
}
