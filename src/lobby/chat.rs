//! Lobby chat commands
//!
//! A dispatch table from `!command` text to typed worker commands, plus the
//! text shown in lobby chat for command results.

use crate::balancer::TeamSplit;
use crate::lobby::worker::{CommandReply, WorkerCommand};
use crate::types::{GameMode, Region};

type Parser = fn(&[&str]) -> Result<WorkerCommand, String>;

struct CommandSpec {
    name: &'static str,
    staff_only: bool,
    usage: &'static str,
    parse: Parser,
}

fn parse_toggle(value: Option<&&str>) -> Result<bool, String> {
    match value.map(|v| v.to_lowercase()) {
        Some(v) if v == "on" => Ok(true),
        Some(v) if v == "off" => Ok(false),
        _ => Err("expected on or off".to_string()),
    }
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "balance",
        staff_only: false,
        usage: "!balance [off|N]",
        parse: |args| match args.first() {
            None => Ok(WorkerCommand::Balance),
            Some(arg) if arg.eq_ignore_ascii_case("off") => Ok(WorkerCommand::ClearBalance),
            Some(arg) => match arg.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(WorkerCommand::Rebalance(n - 1)),
                _ => Err(format!("'{}' is not a candidate number", arg)),
            },
        },
    },
    CommandSpec {
        name: "start",
        staff_only: false,
        usage: "!start",
        parse: |_| Ok(WorkerCommand::Start),
    },
    CommandSpec {
        name: "forcestart",
        staff_only: true,
        usage: "!forcestart",
        parse: |_| Ok(WorkerCommand::ForceStart),
    },
    CommandSpec {
        name: "swap",
        staff_only: true,
        usage: "!swap player1 player2",
        parse: |args| match args {
            [first, second] => Ok(WorkerCommand::Swap(first.to_string(), second.to_string())),
            _ => Err("expected two player names".to_string()),
        },
    },
    CommandSpec {
        name: "mmr",
        staff_only: true,
        usage: "!mmr N",
        parse: |args| {
            args.first()
                .and_then(|v| v.parse::<i32>().ok())
                .map(|v| WorkerCommand::SetMinRating(v.clamp(0, 9000)))
                .ok_or_else(|| "expected a rating".to_string())
        },
    },
    CommandSpec {
        name: "region",
        staff_only: true,
        usage: "!region eu|eue|use|usw|ru|sa",
        parse: |args| {
            let value = args.first().ok_or_else(|| "expected a region".to_string())?;
            value.parse::<Region>().map(WorkerCommand::SetRegion)
        },
    },
    CommandSpec {
        name: "mode",
        staff_only: true,
        usage: "!mode cd|cm|ap|rd",
        parse: |args| {
            let value = args.first().ok_or_else(|| "expected a game mode".to_string())?;
            value.parse::<GameMode>().map(WorkerCommand::SetMode)
        },
    },
    CommandSpec {
        name: "voice",
        staff_only: true,
        usage: "!voice on|off",
        parse: |args| parse_toggle(args.first()).map(WorkerCommand::SetVoiceRequired),
    },
    CommandSpec {
        name: "staff",
        staff_only: true,
        usage: "!staff on|off",
        parse: |args| parse_toggle(args.first()).map(WorkerCommand::SetStaffOnly),
    },
    CommandSpec {
        name: "status",
        staff_only: false,
        usage: "!status",
        parse: |_| Ok(WorkerCommand::Status),
    },
];

/// A recognised chat command
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCommand {
    pub name: &'static str,
    pub staff_only: bool,
    pub command: WorkerCommand,
}

/// Parse one chat line.
///
/// `None` for ordinary chat and unknown commands, `Some(Err(usage))` when a
/// known command has bad arguments.
pub fn parse(text: &str) -> Option<Result<ChatCommand, String>> {
    let text = text.trim();
    let body = text.strip_prefix('!')?;
    let mut words = body.split_whitespace();
    let name = words.next()?.to_lowercase();
    let args: Vec<&str> = words.collect();

    let entry = COMMANDS.iter().find(|entry| entry.name == name)?;
    Some(
        (entry.parse)(&args)
            .map(|command| ChatCommand {
                name: entry.name,
                staff_only: entry.staff_only,
                command,
            })
            .map_err(|e| format!("{} (usage: {})", e, entry.usage)),
    )
}

fn describe_split(split: &TeamSplit) -> Vec<String> {
    let mut lines: Vec<String> = split
        .teams
        .iter()
        .enumerate()
        .map(|(i, team)| {
            let names: Vec<&str> = team.players.iter().map(|p| p.name.as_str()).collect();
            format!(
                "{}: {} (avg. {:.0})",
                if i == 0 { "Radiant" } else { "Dire" },
                names.join(" | "),
                team.mmr
            )
        })
        .collect();
    lines.push(format!("Rating difference: {:.0}", split.mmr_diff));
    lines
}

/// Lobby chat lines for a command result
pub fn format_reply(reply: &CommandReply) -> Vec<String> {
    match reply {
        CommandReply::Balanced { split, candidate } => {
            let mut lines = vec![format!("Balance #{}:", candidate + 1)];
            lines.extend(describe_split(split));
            lines
        }
        CommandReply::BalanceCleared => vec!["Balance cleared.".to_string()],
        CommandReply::Starting { countdown } => vec![format!(
            "Teams are set, starting in {} seconds.",
            countdown.as_secs()
        )],
        CommandReply::Launched { balanced } => {
            if *balanced {
                vec!["Game is starting. GL HF!".to_string()]
            } else {
                vec!["Game is starting without balance, it will not be recorded.".to_string()]
            }
        }
        CommandReply::MustMove(names) => vec![
            "Please join slots according to balance.".to_string(),
            format!("Wrong slot: {}", names.join(", ")),
        ],
        CommandReply::Updated(text) => vec![text.clone()],
        CommandReply::Status(status) => vec![format!(
            "State: {}, queue: {}, balanced: {}",
            status.state,
            status
                .queue_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string()),
            if status.balanced { "yes" } else { "no" }
        )],
        CommandReply::Refused(text) => vec![text.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(text: &str) -> WorkerCommand {
        parse(text).unwrap().unwrap().command
    }

    #[test]
    fn test_dispatch_table() {
        assert_eq!(command("!balance"), WorkerCommand::Balance);
        assert_eq!(command("!balance off"), WorkerCommand::ClearBalance);
        assert_eq!(command("!balance 3"), WorkerCommand::Rebalance(2));
        assert_eq!(command("!START"), WorkerCommand::Start);
        assert_eq!(
            command("!swap Uvs Paul"),
            WorkerCommand::Swap("Uvs".to_string(), "Paul".to_string())
        );
        assert_eq!(command("!mmr 12000"), WorkerCommand::SetMinRating(9000));
        assert_eq!(command("!region eu"), WorkerCommand::SetRegion(Region::Europe));
        assert_eq!(command("!mode ap"), WorkerCommand::SetMode(GameMode::AllPick));
        assert_eq!(command("!voice on"), WorkerCommand::SetVoiceRequired(true));
        assert_eq!(command("!staff off"), WorkerCommand::SetStaffOnly(false));
    }

    #[test]
    fn test_staff_flags() {
        assert!(!parse("!start").unwrap().unwrap().staff_only);
        assert!(parse("!forcestart").unwrap().unwrap().staff_only);
        assert!(parse("!swap a b").unwrap().unwrap().staff_only);
    }

    #[test]
    fn test_bad_arguments_and_plain_chat() {
        assert!(parse("hello there").is_none());
        assert!(parse("!dance").is_none());
        let err = parse("!balance zero").unwrap().unwrap_err();
        assert!(err.contains("usage: !balance"));
        assert!(parse("!voice maybe").unwrap().is_err());
        assert!(parse("!swap onlyone").unwrap().is_err());
    }
}
