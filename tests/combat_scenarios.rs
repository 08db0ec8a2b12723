//! End-to-end combat scenarios against the authoritative session
//!
//! These exercise the combat resolution state machine the way two live
//! clients would: bullets fired, claims raised, health and score flowing
//! back, all without sockets.

use glam::Vec3;
use server::session::{Session, SessionConfig, Target};
use shared::{BulletId, Message, PlayerId, BULLET_TTL_MS, HIT_DAMAGE, MAX_HEALTH, WIN_SCORE};
use std::time::{Duration, Instant};

fn bullet(owner: PlayerId, micros: u64) -> BulletId {
    BulletId {
        owner,
        spawn_micros: micros,
    }
}

fn fire(session: &mut Session, id: BulletId, now: Instant) {
    session.create_bullet(id, Vec3::ZERO, Vec3::new(0.0, 0.0, -60.0), BULLET_TTL_MS, now);
}

/// Two players; one shoots itself at the muzzle, then again after the grace
/// window. The first claim is rejected outright, the second lands for 10.
#[test]
fn self_hit_grace_window_end_to_end() {
    let mut session = Session::new(SessionConfig::default());
    session.connect(1);
    session.connect(2);

    let now = Instant::now();
    let id = bullet(1, 1);
    fire(&mut session, id, now);

    let out = session.bullet_hit(id, 1, now + Duration::from_millis(100));
    assert!(out.is_empty(), "claim inside the grace window must be rejected");
    assert_eq!(session.health(1), Some(MAX_HEALTH));

    let out = session.bullet_hit(id, 1, now + Duration::from_millis(600));
    assert!(!out.is_empty());
    assert_eq!(session.health(1), Some(MAX_HEALTH - HIT_DAMAGE));
}

/// Three 10-damage hits leave the victim at 70 with no score movement and no
/// game over.
#[test]
fn three_standard_hits_never_end_the_game() {
    let mut session = Session::new(SessionConfig::default());
    session.connect(1);
    session.connect(2);
    let now = Instant::now();

    for micros in 0..3u64 {
        let id = bullet(1, micros);
        fire(&mut session, id, now);
        let out = session.bullet_hit(id, 2, now);
        assert!(out
            .iter()
            .all(|o| !matches!(o.msg, Message::GameOver { .. })));
    }

    assert_eq!(session.health(2), Some(MAX_HEALTH - 3 * HIT_DAMAGE));
    assert_eq!(session.score(1), Some(0));
    assert_eq!(session.winner(), None);
}

/// With 40-damage rounds every third hit eliminates; the attacker's score
/// climbs one per elimination and exactly one game over fires at the
/// threshold.
#[test]
fn heavy_rounds_score_once_per_elimination() {
    let config = SessionConfig {
        hit_damage: 40,
        ..SessionConfig::default()
    };
    let mut session = Session::new(config);
    session.connect(1);
    session.connect(2);
    let now = Instant::now();

    let mut game_overs = 0;
    let mut micros = 0u64;
    // Each elimination takes three 40-damage hits (100 -> 60 -> 20 -> reset)
    for elimination in 1..=WIN_SCORE {
        for _ in 0..3 {
            let id = bullet(1, micros);
            micros += 1;
            fire(&mut session, id, now);
            let out = session.bullet_hit(id, 2, now);
            game_overs += out
                .iter()
                .filter(|o| matches!(o.msg, Message::GameOver { .. }))
                .count();
        }
        assert_eq!(session.score(1), Some(elimination));
        assert_eq!(session.health(2), Some(MAX_HEALTH));
    }

    assert_eq!(game_overs, 1);
    assert_eq!(session.winner(), Some(1));
}

/// The game-over broadcast goes to everyone and carries the final table.
#[test]
fn game_over_broadcast_carries_scores() {
    let config = SessionConfig {
        hit_damage: MAX_HEALTH,
        win_score: 1,
        ..SessionConfig::default()
    };
    let mut session = Session::new(config);
    session.connect(1);
    session.connect(2);
    let now = Instant::now();

    let id = bullet(1, 1);
    fire(&mut session, id, now);
    let out = session.bullet_hit(id, 2, now);

    let game_over = out
        .iter()
        .find(|o| matches!(o.msg, Message::GameOver { .. }))
        .expect("threshold reached, game over expected");
    assert_eq!(game_over.to, Target::All);
    match &game_over.msg {
        Message::GameOver { winner, scores } => {
            assert_eq!(*winner, 1);
            assert_eq!(scores.len(), 2);
            assert!(scores.iter().any(|s| s.id == 1 && s.score == 1));
        }
        _ => unreachable!(),
    }
}

/// A player leaves while their bullets are still in flight: claims against
/// the departed id are no-ops and the expiry sweep cleans the leftovers.
#[test]
fn departed_player_bullets_drain_safely() {
    let mut session = Session::new(SessionConfig::default());
    session.connect(1);
    session.connect(2);
    let now = Instant::now();

    fire(&mut session, bullet(2, 1), now);
    fire(&mut session, bullet(2, 2), now);
    session.disconnect(2);
    assert_eq!(session.bullet_count(), 2);

    // A stale claim against the departed player changes nothing
    let out = session.bullet_hit(bullet(2, 1), 2, now + Duration::from_millis(50));
    assert!(out.is_empty());

    // A departed player's bullet can still hit a live target
    let out = session.bullet_hit(bullet(2, 1), 1, now + Duration::from_millis(50));
    assert!(!out.is_empty());
    assert_eq!(session.health(1), Some(MAX_HEALTH - HIT_DAMAGE));

    // The remaining bullet drains on the TTL sweep
    let out = session.expire_bullets(now + Duration::from_millis(BULLET_TTL_MS + 1));
    assert_eq!(out.len(), 1);
    assert_eq!(session.bullet_count(), 0);
}

/// Duplicate claims after a respawn cannot double-count: the bullet record
/// died with the first resolution.
#[test]
fn no_double_scoring_across_respawn() {
    let config = SessionConfig {
        hit_damage: MAX_HEALTH,
        ..SessionConfig::default()
    };
    let mut session = Session::new(config);
    session.connect(1);
    session.connect(2);
    let now = Instant::now();

    let id = bullet(1, 1);
    fire(&mut session, id, now);
    let first = session.bullet_hit(id, 2, now);
    assert!(!first.is_empty());
    assert_eq!(session.score(1), Some(1));

    // Replayed claim referencing the consumed bullet
    let second = session.bullet_hit(id, 2, now + Duration::from_millis(5));
    assert!(second.is_empty());
    assert_eq!(session.score(1), Some(1));
    assert_eq!(session.health(2), Some(MAX_HEALTH));
}
