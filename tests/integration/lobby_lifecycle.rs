//! Complete lobby lifecycle integration tests
//!
//! A filled queue is bound to a worker by the scheduler, the players take
//! their seats, the game is launched and scored, and the next tick hands the
//! worker back to the free pool.

use inhouse_ladder::lobby::{CommandReply, WorkerCommand, WorkerState};
use inhouse_ladder::types::{LobbySlot, MatchOutcome};
use inhouse_ladder::LadderStore;

use crate::fixtures::{
    create_test_ladder, queue_roster, register_players, seat_as, seat_mirrored, REFERENCE_RATINGS,
    WAIT,
};

#[tokio::test]
async fn test_queue_to_recorded_match() {
    let ladder = create_test_ladder(1).await;
    let store = ladder.store();
    let (_, players) = queue_roster(&ladder, "alpha", &REFERENCE_RATINGS, 5000);

    let queue = store.active_queues().unwrap().remove(0);
    assert!(queue.is_full());
    let proposal = queue.proposed.clone().expect("full queue carries a proposal");

    // Step 1: the scheduler reserves the only worker for the queue
    let scheduler = ladder.app.scheduler();
    let summary = scheduler.tick().await.unwrap();
    assert_eq!(summary.bound, 1);
    assert_eq!(summary.active_queues, 1);

    let worker = scheduler.workers()[0].clone();
    assert_eq!(scheduler.assigned_queue(worker.id()).await, Some(queue.id));
    worker
        .wait_for(|s| s.queue_id == Some(queue.id) && s.balanced, WAIT)
        .await
        .unwrap();

    // Step 2: everyone sits where the proposal puts them and the game starts
    let driver = ladder.driver(worker.id());
    seat_as(&driver, &players, &proposal);
    worker
        .wait_for(|s| s.members == players.len(), WAIT)
        .await
        .unwrap();
    assert!(driver.kicked().unwrap().is_empty());
    assert!(driver.team_kicked().unwrap().is_empty());

    let reply = worker.command(WorkerCommand::Start).await.unwrap();
    assert_eq!(reply, CommandReply::Launched { balanced: true });
    assert_eq!(worker.status().state, WorkerState::InGame);
    assert!(store.get_queue(queue.id).unwrap().unwrap().game_started());

    // Live games are never released
    let summary = scheduler.tick().await.unwrap();
    assert_eq!(summary.released, 0);
    assert_eq!(scheduler.assigned_queue(worker.id()).await, Some(queue.id));

    // Step 3: radiant wins and the result is scored
    driver.finish_game(MatchOutcome::RadiantVictory, 9001).unwrap();
    worker
        .wait_for(|s| s.state == WorkerState::Open && s.queue_id.is_none(), WAIT)
        .await
        .unwrap();

    let matches = store.list_matches().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].winner, 0);
    assert_eq!(matches[0].external_id, Some(9001));
    assert_eq!(matches[0].players.len(), 10);

    let total: i32 = players
        .iter()
        .map(|p| {
            store
                .score_changes(&p.id)
                .unwrap()
                .iter()
                .filter(|c| c.match_id == Some(matches[0].id))
                .map(|c| c.mmr_change)
                .sum::<i32>()
        })
        .sum();
    assert_eq!(total, 0, "rating changes of one match are zero-sum");

    for player in &players {
        let after = store.get_player(&player.id).unwrap().unwrap();
        let won = proposal.team_of(&player.id) == Some(0);
        if won {
            assert!(after.ladder_mmr > player.ladder_mmr, "{} should gain", after.name);
        } else {
            assert!(after.ladder_mmr < player.ladder_mmr, "{} should lose", after.name);
        }
    }

    // Step 4: the closed queue is released on the next tick
    assert!(!store.get_queue(queue.id).unwrap().unwrap().active);
    let summary = scheduler.tick().await.unwrap();
    assert_eq!(summary.released, 1);
    assert_eq!(summary.active_queues, 0);
    assert!(scheduler.bindings().await.is_empty());
    assert!(worker.status().is_available());
}

#[tokio::test]
async fn test_mirrored_seating_starts_the_game() {
    let ladder = create_test_ladder(1).await;
    let (_, players) = queue_roster(&ladder, "mirror", &REFERENCE_RATINGS, 6000);
    let scheduler = ladder.app.scheduler();
    scheduler.tick().await.unwrap();

    let worker = scheduler.workers()[0].clone();
    let status = worker.wait_for(|s| s.balanced, WAIT).await.unwrap();
    let queue = ladder
        .store()
        .get_queue(status.queue_id.unwrap())
        .unwrap()
        .unwrap();
    let proposal = queue.proposed.unwrap();

    let driver = ladder.driver(worker.id());
    seat_mirrored(&driver, &players, &proposal);
    worker.wait_for(|s| s.members == 10, WAIT).await.unwrap();

    let reply = worker.command(WorkerCommand::Start).await.unwrap();
    assert_eq!(reply, CommandReply::Launched { balanced: true });

    // The stored split follows the seating, so dire's players are scored as winners
    driver.finish_game(MatchOutcome::DireVictory, 1).unwrap();
    worker
        .wait_for(|s| s.state == WorkerState::Open, WAIT)
        .await
        .unwrap();

    let recorded = &ladder.store().list_matches().unwrap()[0];
    assert_eq!(recorded.winner, 1);
    for player in &players {
        let seated_on = 1 - proposal.team_of(&player.id).unwrap();
        assert_eq!(recorded.split.team_of(&player.id), Some(seated_on));
    }
}

#[tokio::test]
async fn test_single_misplaced_player_blocks_start() {
    let ladder = create_test_ladder(1).await;
    let (_, players) = queue_roster(&ladder, "wrong", &REFERENCE_RATINGS, 7000);
    let scheduler = ladder.app.scheduler();
    scheduler.tick().await.unwrap();

    let worker = scheduler.workers()[0].clone();
    let status = worker.wait_for(|s| s.balanced, WAIT).await.unwrap();
    let proposal = ladder
        .store()
        .get_queue(status.queue_id.unwrap())
        .unwrap()
        .unwrap()
        .proposed
        .unwrap();

    let driver = ladder.driver(worker.id());
    seat_as(&driver, &players, &proposal);
    let stray = players
        .iter()
        .find(|p| proposal.team_of(&p.id) == Some(0))
        .unwrap();
    driver
        .move_to(stray.account_id.unwrap(), LobbySlot::Dire)
        .unwrap();
    worker.wait_for(|s| s.members == 10, WAIT).await.unwrap();

    match worker.command(WorkerCommand::Start).await.unwrap() {
        CommandReply::MustMove(names) => assert!(names.contains(&stray.name)),
        other => panic!("unexpected reply {:?}", other),
    }
    assert_eq!(worker.status().state, WorkerState::Open);
    assert_eq!(driver.launches().unwrap(), 0);
}

#[tokio::test]
async fn test_outsiders_are_removed_from_a_reserved_lobby() {
    let ladder = create_test_ladder(1).await;
    let (_, players) = queue_roster(&ladder, "reserved", &REFERENCE_RATINGS, 8000);
    let outsider = register_players(ladder.store().as_ref(), "visitor", &[4000], 9000).remove(0);

    let scheduler = ladder.app.scheduler();
    scheduler.tick().await.unwrap();
    let worker = scheduler.workers()[0].clone();
    worker.wait_for(|s| s.queue_id.is_some(), WAIT).await.unwrap();

    let driver = ladder.driver(worker.id());
    driver
        .join(players[0].account_id.unwrap(), &players[0].name, LobbySlot::Radiant)
        .unwrap();
    driver
        .join(outsider.account_id.unwrap(), &outsider.name, LobbySlot::Radiant)
        .unwrap();

    tokio::time::timeout(WAIT, async {
        while driver.team_kicked().unwrap().is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("outsider was never moved out of the teams");

    // Queue members keep their seat, the outsider may stay as a spectator
    assert_eq!(driver.team_kicked().unwrap(), vec![outsider.account_id.unwrap()]);
    assert!(driver.kicked().unwrap().is_empty());
}
