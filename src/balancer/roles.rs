//! Positional role assignment for a single team

use crate::balancer::team::Team;
use crate::types::Role;

/// Best legal role assignment found for a team
#[derive(Debug, Clone, PartialEq)]
pub struct RoleAssignment {
    /// `roles[i]` is the role of the team's i-th player
    pub roles: Vec<Role>,
    pub score: u32,
}

/// Rearrange `items` into the next lexicographic permutation.
///
/// Returns false once the last permutation has been reached.
fn next_permutation(items: &mut [usize]) -> bool {
    if items.len() < 2 {
        return false;
    }

    let mut pivot = items.len() - 1;
    while pivot > 0 && items[pivot - 1] >= items[pivot] {
        pivot -= 1;
    }
    if pivot == 0 {
        return false;
    }

    let mut successor = items.len() - 1;
    while items[successor] <= items[pivot - 1] {
        successor -= 1;
    }
    items.swap(pivot - 1, successor);
    items[pivot..].reverse();
    true
}

/// Search every permutation of roles over the team's players.
///
/// A permutation is illegal when a carry or mid player is rated more than
/// `core_role_max_gap` below the team's best player. Permutations are visited
/// in lexicographic order and the first one with the highest score wins.
/// Returns `None` when no legal permutation exists or the team size does not
/// match the number of roles.
pub fn best_assignment(team: &Team, core_role_max_gap: i32) -> Option<RoleAssignment> {
    if team.players.len() != Role::ALL.len() {
        return None;
    }
    let top = team.top_rating()?;

    let mut order: Vec<usize> = (0..Role::ALL.len()).collect();
    let mut best: Option<RoleAssignment> = None;

    loop {
        let legal = order.iter().enumerate().all(|(player_idx, role_idx)| {
            let role = Role::ALL[*role_idx];
            !role.is_core() || top - team.players[player_idx].rating <= core_role_max_gap
        });

        if legal {
            let score: u32 = order
                .iter()
                .enumerate()
                .map(|(player_idx, role_idx)| {
                    team.players[player_idx].roles.get(Role::ALL[*role_idx]) as u32
                })
                .sum();

            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(RoleAssignment {
                    roles: order.iter().map(|idx| Role::ALL[*idx]).collect(),
                    score,
                });
            }
        }

        if !next_permutation(&mut order) {
            break;
        }
    }

    best
}

/// Attach the best assignment to the team, or natural order with no score
pub fn assign_roles(team: &mut Team, core_role_max_gap: i32) {
    match best_assignment(team, core_role_max_gap) {
        Some(assignment) => {
            team.roles = Some(assignment.roles);
            team.role_score = assignment.score;
        }
        None => {
            team.roles = Some(Role::ALL.iter().copied().take(team.players.len()).collect());
            team.role_score = 0;
        }
    }
}
