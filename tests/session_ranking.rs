//! Standings and membership rules of a session fed by drone updates

use std::sync::Arc;

use racing_core::config::Settings;
use racing_core::net::{MessageError, MessageKind, NetMessage};
use racing_core::net::protocol::DroneUpdate;
use racing_core::race::physics::CarClass;
use racing_core::race::{
    CircuitData, CircuitPoint, Contestant, Session, SessionError, SessionMode, TIME_NOT_SET,
};
use uuid::Uuid;

fn stadium() -> Arc<CircuitData> {
    Arc::new(CircuitData::stadium("stadium", 200.0, 50.0, 120, 4.0, 9.0).unwrap())
}

fn update(
    id: Uuid,
    lap: u32,
    intermediate: usize,
    point: usize,
    last_lap: Option<u32>,
) -> DroneUpdate {
    DroneUpdate {
        id,
        x: point as f32,
        y: None,
        z: intermediate as f32 * 50.0,
        orientation: 0.0,
        direction: 0.0,
        lap,
        intermediate,
        point,
        laptime: 1_000,
        speed: 30.0,
        angular_speed: 0.0,
        last_lap,
    }
}

/// Session with drones named `names`, started
fn drone_session(mode: SessionMode, laps: u32, names: &[&str]) -> (Session, Vec<Uuid>) {
    let settings = Settings::default();
    let mut session = Session::new(mode, laps, stadium());
    let mut ids = Vec::new();
    for name in names {
        let id = Uuid::new_v4();
        session
            .add_contestant(Contestant::drone(id, *name, CarClass::Sport, &settings))
            .unwrap();
        ids.push(id);
    }
    session.set_started();
    (session, ids)
}

#[test]
fn race_ranks_by_lap_then_sector_then_point() {
    let (mut session, ids) = drone_session(SessionMode::Race, 5, &["a", "b", "c"]);
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    assert!(session.deliver(&update(b, 2, 1, 45, Some(62_500)).to_message()).unwrap());
    assert!(session.deliver(&update(a, 2, 1, 50, Some(61_000)).to_message()).unwrap());
    assert!(session.deliver(&update(c, 1, 2, 90, None).to_message()).unwrap());

    assert_eq!(session.race_position(a), Ok(1));
    assert_eq!(session.race_position(b), Ok(2));
    assert_eq!(session.race_position(c), Ok(3));
    assert_eq!(session.contestant_at(1).unwrap().id(), a);

    // A later sector beats a higher point in an earlier one
    session.deliver(&update(c, 2, 2, 81, Some(70_000)).to_message()).unwrap();
    assert_eq!(session.race_position(c), Ok(1));

    assert_eq!(session.fastest_lap().unwrap().id(), a);
    assert_eq!(session.fastest_laptime(), 61_000);
}

#[test]
fn positions_form_a_permutation() {
    let names = ["e", "d", "c", "b", "a"];
    let (mut session, ids) = drone_session(SessionMode::Race, 5, &names);
    let placements = [(1, 0, 3), (2, 0, 1), (1, 2, 90), (2, 0, 1), (1, 0, 3)];
    for (id, (lap, intermediate, point)) in ids.iter().zip(placements) {
        session
            .deliver(&update(*id, lap, intermediate, point, None).to_message())
            .unwrap();
    }

    let mut positions: Vec<usize> = ids
        .iter()
        .map(|id| session.race_position(*id).unwrap())
        .collect();
    for position in 1..=ids.len() {
        let at = session.contestant_at(position).unwrap();
        assert_eq!(session.race_position(at.id()), Ok(position));
    }
    positions.sort_unstable();
    assert_eq!(positions, vec![1, 2, 3, 4, 5]);
    assert!(session.contestant_at(ids.len() + 1).is_err());

    // Equal progress falls back to name order
    let first = session.contestant_at(1).unwrap().name().to_string();
    let second = session.contestant_at(2).unwrap().name().to_string();
    assert_eq!((first.as_str(), second.as_str()), ("b", "d"));
}

#[test]
fn finish_order_breaks_equal_progress() {
    let (mut session, ids) = drone_session(SessionMode::Race, 3, &["alpha", "zulu"]);
    let (alpha, zulu) = (ids[0], ids[1]);

    session.deliver(&update(zulu, 4, 0, 0, Some(60_000)).to_message()).unwrap();
    assert!(session.contestant(zulu).unwrap().is_finished());
    assert!(!session.all_finished());

    session.deliver(&update(alpha, 4, 0, 0, Some(59_000)).to_message()).unwrap();
    assert!(session.all_finished());
    assert_eq!(session.race_position(zulu), Ok(1));
    assert_eq!(session.race_position(alpha), Ok(2));

    let results = session.results();
    assert_eq!(results[0].id, zulu);
    assert!(results.iter().all(|r| r.finished));
}

#[test]
fn time_mode_ranks_by_best_lap() {
    let (mut session, ids) = drone_session(SessionMode::Time, 0, &["a", "b", "c"]);
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    session.deliver(&update(a, 3, 0, 0, Some(61_000)).to_message()).unwrap();
    session.deliver(&update(b, 2, 0, 0, Some(60_000)).to_message()).unwrap();
    session.deliver(&update(c, 9, 0, 0, None).to_message()).unwrap();

    assert_eq!(session.race_position(b), Ok(1));
    assert_eq!(session.race_position(a), Ok(2));
    assert_eq!(session.race_position(c), Ok(3));
    assert_eq!(session.fastest_laptime(), 60_000);
    // Time mode never finishes contestants on lap count
    assert!(!session.all_finished());
}

#[test]
fn best_lap_never_gets_worse() {
    let (mut session, ids) = drone_session(SessionMode::Time, 0, &["a"]);
    let a = ids[0];
    let mut best = TIME_NOT_SET;
    for (lap, time) in [(2, 64_000), (3, 62_000), (4, 66_000), (5, 61_500)] {
        session.deliver(&update(a, lap, 0, 0, Some(time)).to_message()).unwrap();
        let now = session.contestant(a).unwrap().best_lap().unwrap().laptime();
        assert!(now <= best);
        best = now;
    }
    assert_eq!(best, 61_500);
}

#[test]
fn membership_is_closed_after_start() {
    let (mut session, _) = drone_session(SessionMode::Race, 3, &["a"]);
    let late = Contestant::ai("late", CarClass::Sport, &Settings::default());
    assert_eq!(session.add_contestant(late), Err(SessionError::AlreadyStarted));

    let stranger = Uuid::new_v4();
    assert_eq!(session.race_position(stranger), Err(SessionError::NotAMember(stranger)));
}

#[test]
fn bad_messages_are_reported_not_applied() {
    let (mut session, ids) = drone_session(SessionMode::Race, 3, &["a"]);

    let missing = NetMessage::new(MessageKind::Update).with("id", ids[0].to_string().as_str());
    assert!(matches!(session.deliver(&missing), Err(MessageError::MissingParam(_))));

    assert_eq!(session.deliver(&NetMessage::chat("hello")), Ok(false));

    let stranger = update(Uuid::new_v4(), 1, 0, 0, None);
    assert_eq!(session.deliver(&stranger.to_message()), Ok(false));
    assert_eq!(session.contestant(ids[0]).unwrap().lap(), 1);
}

#[test]
fn point_is_counted_from_the_start_marker() {
    // Same stadium, markers moved to 10, 50 and 90
    let points = stadium()
        .points()
        .iter()
        .enumerate()
        .map(|(i, p)| CircuitPoint {
            intermediate: matches!(i, 10 | 50 | 90),
            ..*p
        })
        .collect();
    let circuit = Arc::new(CircuitData::new("offset", points).unwrap());
    assert_eq!(circuit.start_point(), 10);

    let settings = Settings::default();
    let mut session = Session::new(SessionMode::Race, 5, circuit);
    let (wrapped, behind) = (Uuid::new_v4(), Uuid::new_v4());
    for (id, name) in [(wrapped, "a"), (behind, "b")] {
        session
            .add_contestant(Contestant::drone(id, name, CarClass::Sport, &settings))
            .unwrap();
    }
    session.set_started();

    // Both in the last sector of lap 2; one has passed the end of the point list
    session.deliver(&update(wrapped, 2, 2, 5, Some(60_000)).to_message()).unwrap();
    session.deliver(&update(behind, 2, 2, 100, Some(60_000)).to_message()).unwrap();

    assert_eq!(session.race_position(wrapped), Ok(1));
    assert_eq!(session.race_position(behind), Ok(2));
}

#[test]
fn out_of_range_point_does_not_break_ranking() {
    let (mut session, ids) = drone_session(SessionMode::Race, 3, &["a", "b"]);
    let mut far = update(ids[0], 1, 0, usize::MAX, None);
    far.x = 0.0;
    assert!(session.apply_update(&far));

    let c = session.contestant(ids[0]).unwrap();
    assert!(c.point() < 120);
    assert!(session.race_position(ids[0]).is_ok());
    assert!(session.race_position(ids[1]).is_ok());
}
