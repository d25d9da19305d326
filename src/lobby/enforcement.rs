//! Lobby eligibility rules
//!
//! Pure functions deciding who gets kicked from an open lobby and whether
//! the live team slots match the split being enforced.

use crate::balancer::TeamSplit;
use crate::config::LobbySettings;
use crate::queue::LadderQueue;
use crate::types::{AccountId, LobbyMember, Player, PlayerId};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Why a member is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KickReason {
    LobbyBan,
    PlayBan,
    NotInQueue,
    NotInBalance,
    VoiceRequired,
    BelowMinRating,
    StaffOnly,
}

impl KickReason {
    /// Metric label
    pub fn label(self) -> &'static str {
        match self {
            KickReason::LobbyBan => "lobby_ban",
            KickReason::PlayBan => "play_ban",
            KickReason::NotInQueue => "not_in_queue",
            KickReason::NotInBalance => "not_in_balance",
            KickReason::VoiceRequired => "voice_required",
            KickReason::BelowMinRating => "below_min_rating",
            KickReason::StaffOnly => "staff_only",
        }
    }
}

impl fmt::Display for KickReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            KickReason::LobbyBan => "banned from the lobby",
            KickReason::PlayBan => "banned from playing",
            KickReason::NotInQueue => "not in the queue",
            KickReason::NotInBalance => "not in the balance",
            KickReason::VoiceRequired => "voice is required",
            KickReason::BelowMinRating => "rating too low",
            KickReason::StaffOnly => "staff only lobby",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kick {
    pub account_id: AccountId,
    pub name: String,
    /// Whole lobby when true, team slot only otherwise
    pub from_lobby: bool,
    pub reason: KickReason,
}

/// What the enforcement pass checks against
#[derive(Debug, Clone, Copy)]
pub struct Policy<'a> {
    pub settings: &'a LobbySettings,
    /// Bound queue; its membership is authoritative when present
    pub queue: Option<&'a LadderQueue>,
    pub split: Option<&'a TeamSplit>,
}

/// Kicks for the current members, in rule order, one per member
pub fn plan_kicks(
    members: &[LobbyMember],
    players: &HashMap<AccountId, Player>,
    policy: Policy<'_>,
) -> Vec<Kick> {
    let mut kicks = Vec::new();

    for member in members {
        let player = players.get(&member.account_id);
        let in_team = member.slot.team_index().is_some();

        let kick = |reason: KickReason, from_lobby: bool| Kick {
            account_id: member.account_id,
            name: member.name.clone(),
            from_lobby,
            reason,
        };

        if player.map_or(false, Player::is_banned_from_lobby) {
            kicks.push(kick(KickReason::LobbyBan, true));
            continue;
        }
        if !in_team {
            continue;
        }
        if player.map_or(false, Player::is_banned_from_playing) {
            kicks.push(kick(KickReason::PlayBan, false));
            continue;
        }

        if let Some(queue) = policy.queue {
            if !player.map_or(false, |p| queue.contains(&p.id)) {
                kicks.push(kick(KickReason::NotInQueue, false));
            }
            continue;
        }

        if let Some(split) = policy.split {
            if !player.map_or(false, |p| split.team_of(&p.id).is_some()) {
                kicks.push(kick(KickReason::NotInBalance, false));
                continue;
            }
        }
        if policy.settings.voice_required && player.map_or(false, |p| p.voice_issues) {
            kicks.push(kick(KickReason::VoiceRequired, false));
            continue;
        }
        if policy.settings.min_rating > 0
            && player.map_or(true, |p| p.ladder_mmr < policy.settings.min_rating)
        {
            kicks.push(kick(KickReason::BelowMinRating, false));
            continue;
        }
        if policy.settings.staff_only && !player.map_or(false, |p| p.bot_access) {
            kicks.push(kick(KickReason::StaffOnly, false));
        }
    }

    kicks
}

/// How the live team slots relate to a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamCheck {
    /// Radiant holds team 0, dire team 1
    Matches,
    /// Radiant holds team 1, dire team 0
    Mirrored,
    /// Names of split players not in their slot for the closer orientation
    Mismatch { must_move: Vec<String> },
}

/// Compare the lobby's team slots with `split`
pub fn check_teams(
    members: &[LobbyMember],
    players: &HashMap<AccountId, Player>,
    split: &TeamSplit,
) -> TeamCheck {
    let mut sides: [HashSet<PlayerId>; 2] = [HashSet::new(), HashSet::new()];
    let mut strangers = 0usize;
    for member in members {
        let Some(side) = member.slot.team_index() else {
            continue;
        };
        match players.get(&member.account_id) {
            Some(player) => {
                sides[side].insert(player.id.clone());
            }
            None => strangers += 1,
        }
    }

    let expected = [split.teams[0].player_ids(), split.teams[1].player_ids()];
    if strangers == 0 {
        if sides[0] == expected[0] && sides[1] == expected[1] {
            return TeamCheck::Matches;
        }
        if sides[0] == expected[1] && sides[1] == expected[0] {
            return TeamCheck::Mirrored;
        }
    }

    // Players out of place when team 0 should be on side `first`
    let misplaced = |first: usize| -> Vec<String> {
        let mut names = Vec::new();
        for (team_idx, team) in split.teams.iter().enumerate() {
            let side = if team_idx == 0 { first } else { 1 - first };
            for player in &team.players {
                if !sides[side].contains(&player.id) {
                    names.push(player.name.clone());
                }
            }
        }
        names
    };

    let straight = misplaced(0);
    let mirrored = misplaced(1);
    let must_move = if mirrored.len() < straight.len() {
        mirrored
    } else {
        straight
    };
    TeamCheck::Mismatch { must_move }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{balance_from_teams, BalancePlayer};
    use crate::config::BalancerConfig;
    use crate::queue::QueueChannel;
    use crate::types::{BanLevel, LobbySlot, RoleScores};
    use chrono::Utc;

    fn player(i: u64, rating: i32) -> Player {
        Player {
            id: format!("id{}", i),
            name: format!("p{}", i),
            account_id: Some(i),
            discord_id: None,
            dota_mmr: rating,
            ladder_mmr: rating,
            score: 25,
            rank_ladder_mmr: 0,
            rank_score: 0,
            roles: RoleScores::default(),
            banned: None,
            vouched: true,
            voice_issues: false,
            bot_access: false,
            min_allowed_mmr: 0,
            max_allowed_mmr: 0,
            created_at: Utc::now(),
        }
    }

    fn roster() -> HashMap<AccountId, Player> {
        (0..10).map(|i| (i, player(i, 3000 + i as i32 * 100))).collect()
    }

    fn split(players: &HashMap<AccountId, Player>) -> TeamSplit {
        let side = |range: std::ops::Range<u64>| -> Vec<BalancePlayer> {
            range.map(|i| BalancePlayer::from(&players[&i])).collect()
        };
        balance_from_teams(side(0..5), side(5..10), &BalancerConfig::default()).unwrap()
    }

    fn lobby(radiant: &[u64], dire: &[u64]) -> Vec<LobbyMember> {
        let seat = |ids: &[u64], slot: LobbySlot| -> Vec<LobbyMember> {
            ids.iter()
                .map(|i| LobbyMember {
                    account_id: *i,
                    name: format!("p{}", i),
                    slot,
                })
                .collect()
        };
        let mut members = seat(radiant, LobbySlot::Radiant);
        members.extend(seat(dire, LobbySlot::Dire));
        members
    }

    #[test]
    fn test_start_check_accepts_both_orientations() {
        let players = roster();
        let split = split(&players);

        let straight = lobby(&[0, 1, 2, 3, 4], &[5, 6, 7, 8, 9]);
        assert_eq!(check_teams(&straight, &players, &split), TeamCheck::Matches);

        let mirrored = lobby(&[5, 6, 7, 8, 9], &[0, 1, 2, 3, 4]);
        assert_eq!(check_teams(&mirrored, &players, &split), TeamCheck::Mirrored);

        let one_off = lobby(&[0, 1, 2, 3, 5], &[4, 6, 7, 8, 9]);
        match check_teams(&one_off, &players, &split) {
            TeamCheck::Mismatch { must_move } => {
                assert_eq!(must_move.len(), 2);
                assert!(must_move.contains(&"p4".to_string()));
                assert!(must_move.contains(&"p5".to_string()));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_start_check_rejects_unknown_member() {
        let players = roster();
        let split = split(&players);
        let mut members = lobby(&[0, 1, 2, 3, 4], &[5, 6, 7, 8]);
        members.push(LobbyMember {
            account_id: 42,
            name: "stranger".to_string(),
            slot: LobbySlot::Dire,
        });

        match check_teams(&members, &players, &split) {
            TeamCheck::Mismatch { must_move } => assert_eq!(must_move, vec!["p9".to_string()]),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_bans_come_first() {
        let mut players = roster();
        if let Some(p) = players.get_mut(&0) {
            p.banned = Some(BanLevel::PlayingAndLobby);
        }
        if let Some(p) = players.get_mut(&1) {
            p.banned = Some(BanLevel::Playing);
        }
        let mut members = lobby(&[0, 1], &[]);
        members.push(LobbyMember {
            account_id: 1,
            name: "p1-spec".to_string(),
            slot: LobbySlot::Spectator,
        });

        let settings = LobbySettings::default();
        let kicks = plan_kicks(
            &members,
            &players,
            Policy {
                settings: &settings,
                queue: None,
                split: None,
            },
        );
        assert_eq!(kicks.len(), 2);
        assert_eq!(kicks[0].reason, KickReason::LobbyBan);
        assert!(kicks[0].from_lobby);
        assert_eq!(kicks[1].reason, KickReason::PlayBan);
        assert!(!kicks[1].from_lobby);
    }

    #[test]
    fn test_queue_mode_kicks_outsiders_only() {
        let players = roster();
        let channel = QueueChannel::new("main", 0);
        let mut queue = LadderQueue::new(&channel, 10);
        for i in 0..9u64 {
            queue.members.push(crate::queue::QueueMember {
                player_id: format!("id{}", i),
                joined_at: Utc::now(),
            });
        }

        // Voice and rating rules do not apply in queue mode
        let settings = LobbySettings {
            min_rating: 9000,
            voice_required: true,
            ..LobbySettings::default()
        };
        let mut members = lobby(&[0, 1, 2, 3, 4], &[5, 6, 7, 8, 9]);
        members.push(LobbyMember {
            account_id: 77,
            name: "watcher".to_string(),
            slot: LobbySlot::Unassigned,
        });

        let kicks = plan_kicks(
            &members,
            &players,
            Policy {
                settings: &settings,
                queue: Some(&queue),
                split: None,
            },
        );
        assert_eq!(kicks.len(), 1);
        assert_eq!(kicks[0].account_id, 9);
        assert_eq!(kicks[0].reason, KickReason::NotInQueue);
    }

    #[test]
    fn test_legacy_rules() {
        let mut players = roster();
        if let Some(p) = players.get_mut(&2) {
            p.voice_issues = true;
        }
        if let Some(p) = players.get_mut(&3) {
            p.bot_access = true;
        }
        let split = split(&players);

        let mut members = lobby(&[0, 2, 3], &[9]);
        members.push(LobbyMember {
            account_id: 50,
            name: "stranger".to_string(),
            slot: LobbySlot::Dire,
        });

        let settings = LobbySettings {
            voice_required: true,
            min_rating: 3250,
            ..LobbySettings::default()
        };
        let kicks = plan_kicks(
            &members,
            &players,
            Policy {
                settings: &settings,
                queue: None,
                split: Some(&split),
            },
        );
        let reasons: Vec<(AccountId, KickReason)> =
            kicks.iter().map(|k| (k.account_id, k.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (0, KickReason::BelowMinRating),
                (2, KickReason::VoiceRequired),
                (50, KickReason::NotInBalance),
            ]
        );

        let staff_only = LobbySettings {
            staff_only: true,
            ..LobbySettings::default()
        };
        let kicks = plan_kicks(
            &lobby(&[3, 4], &[]),
            &players,
            Policy {
                settings: &staff_only,
                queue: None,
                split: None,
            },
        );
        assert_eq!(kicks.len(), 1);
        assert_eq!(kicks[0].account_id, 4);
        assert_eq!(kicks[0].reason, KickReason::StaffOnly);
    }
}
