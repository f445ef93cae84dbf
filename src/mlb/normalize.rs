//! Raw stats API JSON to flat rows.
//!
//! Every function here is pure. Nested fields are read through JSON pointers so
//! a missing intermediate object falls back to a default instead of failing.
//! A row whose natural key cannot be read is dropped and counted.

use std::collections::BTreeMap;

use chrono::DateTime;
use log::{debug, warn};
use serde_json::Value;

use crate::mlb::models::{
    Game, NormalizedBatch, PlayerSeasonStat, ScheduleEntry, Standing, TeamSeasonStat,
};

pub fn text(raw: &Value, pointer: &str) -> Option<String> {
    match raw.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer from a number or a numeric string.
pub fn int(raw: &Value, pointer: &str) -> Option<i64> {
    match raw.pointer(pointer)? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Float from a number or a string like `".312"` or `"4.05"`. Placeholders the
/// API uses for undefined rates (`"-.--"`, `".---"`) yield `None`.
pub fn float(raw: &Value, pointer: &str) -> Option<f64> {
    let parsed = match raw.pointer(pointer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

pub fn count(raw: &Value, pointer: &str) -> i64 {
    int(raw, pointer).unwrap_or(0)
}

pub fn rate(raw: &Value, pointer: &str) -> f64 {
    float(raw, pointer).unwrap_or(0.0)
}

/// Games behind the division leader. The leader is reported as `"-"`.
pub fn games_back(raw: &Value, pointer: &str) -> f64 {
    match raw.pointer(pointer) {
        Some(Value::String(s)) if s.trim() == "-" => 0.0,
        _ => rate(raw, pointer),
    }
}

fn array<'a>(raw: &'a Value, pointer: &str) -> &'a [Value] {
    raw.pointer(pointer).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn collect_batch<'a, R, I, F>(kind: &str, raws: I, normalize: F) -> NormalizedBatch<R>
where
    I: IntoIterator<Item = &'a Value>,
    F: Fn(&Value) -> Option<R>,
{
    let mut batch = NormalizedBatch::default();
    for raw in raws {
        match normalize(raw) {
            Some(record) => batch.records.push(record),
            None => {
                batch.rejected += 1;
                warn!("Skipping {} with no natural key: {}", kind, raw);
            }
        }
    }
    batch
}

fn games_in_schedule<'a>(schedule: &'a Value) -> impl Iterator<Item = &'a Value> + 'a {
    array(schedule, "/dates").iter().flat_map(|date| array(date, "/games").iter())
}

pub fn normalize_game(raw: &Value) -> Option<Game> {
    Some(Game {
        game_id: int(raw, "/gamePk")?,
        date: text(raw, "/gameDate"),
        status: text(raw, "/status/detailedState"),
        home_team: text(raw, "/teams/home/team/name"),
        away_team: text(raw, "/teams/away/team/name"),
        home_score: int(raw, "/teams/home/score"),
        away_score: int(raw, "/teams/away/score"),
    })
}

pub fn games_from_schedule(schedule: &Value) -> NormalizedBatch<Game> {
    collect_batch("game", games_in_schedule(schedule), normalize_game)
}

/// `gameDate` is an RFC 3339 UTC timestamp; the start time is kept as `HH:MM`.
fn start_time(game_date: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(game_date)
        .ok()
        .map(|dt| dt.naive_utc().format("%H:%M").to_string())
}

pub fn normalize_schedule_entry(raw: &Value) -> Option<ScheduleEntry> {
    let game_id = int(raw, "/gamePk")?;
    let game_date = text(raw, "/gameDate");
    let date = text(raw, "/officialDate")
        .or_else(|| game_date.as_deref().and_then(|d| d.get(..10)).map(str::to_string));
    Some(ScheduleEntry {
        game_id,
        date,
        game_time: game_date.as_deref().and_then(start_time),
        home_team: text(raw, "/teams/home/team/name"),
        away_team: text(raw, "/teams/away/team/name"),
        venue: text(raw, "/venue/name"),
        home_probable_pitcher: text(raw, "/teams/home/probablePitcher/fullName"),
        away_probable_pitcher: text(raw, "/teams/away/probablePitcher/fullName"),
    })
}

pub fn schedule_from_response(schedule: &Value) -> NormalizedBatch<ScheduleEntry> {
    collect_batch("schedule entry", games_in_schedule(schedule), normalize_schedule_entry)
}

pub fn normalize_standing(team_record: &Value, season: i32, division: Option<&str>) -> Option<Standing> {
    Some(Standing {
        season,
        team_id: int(team_record, "/team/id")?,
        team_name: text(team_record, "/team/name"),
        division: division.map(str::to_string),
        wins: count(team_record, "/wins"),
        losses: count(team_record, "/losses"),
        win_pct: rate(team_record, "/winningPercentage"),
        games_back: games_back(team_record, "/gamesBack"),
    })
}

/// Walks every division block of a standings response. The season comes from
/// the block, then the response, then `fallback_season`.
pub fn standings_from_response(standings: &Value, fallback_season: i32) -> NormalizedBatch<Standing> {
    let response_season = int(standings, "/season");
    let mut batch = NormalizedBatch::default();
    for record in array(standings, "/records") {
        let season = int(record, "/season")
            .or(response_season)
            .map(|s| s as i32)
            .unwrap_or(fallback_season);
        let division = text(record, "/division/name");
        let block = collect_batch("standing", array(record, "/teamRecords"), |team_record| {
            normalize_standing(team_record, season, division.as_deref())
        });
        batch.records.extend(block.records);
        batch.rejected += block.rejected;
    }
    batch
}

pub fn normalize_player_stat(split: &Value, season: i32) -> Option<PlayerSeasonStat> {
    Some(PlayerSeasonStat {
        season,
        player_id: int(split, "/player/id")?,
        team_id: int(split, "/team/id"),
        player_name: text(split, "/player/fullName"),
        games_played: count(split, "/stat/gamesPlayed"),
        avg: rate(split, "/stat/avg"),
        ops: rate(split, "/stat/ops"),
        hr: count(split, "/stat/homeRuns"),
        rbi: count(split, "/stat/rbi"),
        so: count(split, "/stat/strikeOuts"),
    })
}

pub fn player_stats_from_response(stats: &Value, season: i32) -> NormalizedBatch<PlayerSeasonStat> {
    let splits = array(stats, "/stats").iter().flat_map(|block| array(block, "/splits").iter());
    collect_batch("player stat line", splits, |split| normalize_player_stat(split, season))
}

/// Players listed on a `/teams/{id}/roster` response, with whether the entry
/// is on the active roster (status code `A`).
pub fn roster_players(roster: &Value) -> Vec<(i64, bool)> {
    array(roster, "/roster")
        .iter()
        .filter_map(|entry| {
            let active = text(entry, "/status/code").map_or(false, |code| code == "A");
            int(entry, "/person/id").map(|id| (id, active))
        })
        .collect()
}

fn apply_hitting(row: &mut TeamSeasonStat, stat: &Value) {
    row.games_played = Some(count(stat, "/gamesPlayed"));
    row.runs_scored = Some(count(stat, "/runs"));
    row.home_runs = Some(count(stat, "/homeRuns"));
    row.batting_avg = Some(rate(stat, "/avg"));
    row.obp = Some(rate(stat, "/obp"));
    row.slg = Some(rate(stat, "/slg"));
    row.stolen_bases = Some(count(stat, "/stolenBases"));
    row.caught_stealing = Some(count(stat, "/caughtStealing"));
}

fn apply_pitching(row: &mut TeamSeasonStat, stat: &Value) {
    row.wins = Some(count(stat, "/wins"));
    row.losses = Some(count(stat, "/losses"));
    row.win_percentage = Some(rate(stat, "/winPercentage"));
    row.era = Some(rate(stat, "/era"));
    row.strikeouts = Some(count(stat, "/strikeOuts"));
    row.walks = Some(count(stat, "/baseOnBalls"));
    row.runs_allowed = Some(count(stat, "/runs"));
}

fn apply_fielding(row: &mut TeamSeasonStat, stat: &Value) {
    row.fielding_pct = Some(rate(stat, "/fielding"));
    row.errors = Some(count(stat, "/errors"));
    row.double_plays = Some(count(stat, "/doublePlays"));
}

/// Merges the hitting, pitching and fielding splits of a team stats response
/// into one row per team, ordered by team id.
///
/// The group name is read from the stats block, or from the split itself when
/// the block does not carry one.
pub fn team_stats_from_response(
    response: &Value,
    season: i32,
    updated_at: &str,
) -> NormalizedBatch<TeamSeasonStat> {
    let mut merged: BTreeMap<i64, TeamSeasonStat> = BTreeMap::new();
    let mut rejected = 0;

    for block in array(response, "/stats") {
        let block_group = text(block, "/group/displayName");
        for split in array(block, "/splits") {
            let team_id = match int(split, "/team/id") {
                Some(id) => id,
                None => {
                    rejected += 1;
                    warn!("Skipping team stat split with no team id: {}", split);
                    continue;
                }
            };
            let row = merged
                .entry(team_id)
                .or_insert_with(|| TeamSeasonStat::empty(season, team_id, updated_at));
            if row.team_name.is_none() {
                row.team_name = text(split, "/team/name");
            }

            let group = block_group
                .clone()
                .or_else(|| text(split, "/group/displayName"))
                .unwrap_or_default()
                .to_lowercase();
            let stat = split.get("stat").unwrap_or(&Value::Null);
            match group.as_str() {
                "hitting" => apply_hitting(row, stat),
                "pitching" => apply_pitching(row, stat),
                "fielding" => apply_fielding(row, stat),
                other => debug!("Ignoring team stat group {:?} for team {}", other, team_id),
            }
        }
    }

    NormalizedBatch { records: merged.into_values().collect(), rejected }
}
