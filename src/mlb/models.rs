use serde::{Deserialize, Serialize};

/// A flat row bound for one table, written with an upsert on its conflict key.
pub trait Record: Serialize {
    const TABLE: &'static str;
    const CONFLICT_KEYS: &'static [&'static str];
}

/// Output of one normalization pass: the rows that made it and how many raw
/// entries were dropped for lacking their natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch<R> {
    pub records: Vec<R>,
    pub rejected: usize,
}

impl<R> Default for NormalizedBatch<R> {
    fn default() -> Self {
        NormalizedBatch { records: Vec::new(), rejected: 0 }
    }
}

impl<R> NormalizedBatch<R> {
    pub fn fetched(&self) -> usize {
        self.records.len() + self.rejected
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: i64,
    pub date: Option<String>,
    pub status: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub season: i32,
    pub team_id: i64,
    pub team_name: Option<String>,
    pub division: Option<String>,
    pub wins: i64,
    pub losses: i64,
    pub win_pct: f64,
    pub games_back: f64,
}

/// Season batting line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSeasonStat {
    pub season: i32,
    pub player_id: i64,
    pub team_id: Option<i64>,
    pub player_name: Option<String>,
    pub games_played: i64,
    pub avg: f64,
    pub ops: f64,
    pub hr: i64,
    pub rbi: i64,
    pub so: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub game_id: i64,
    pub date: Option<String>,
    pub game_time: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub venue: Option<String>,
    pub home_probable_pitcher: Option<String>,
    pub away_probable_pitcher: Option<String>,
}

/// Hitting, pitching and fielding aggregates for one team merged into a
/// single row. A column stays `None` when its group was missing from the
/// response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSeasonStat {
    pub season: i32,
    pub team_id: i64,
    pub team_name: Option<String>,
    // hitting
    pub games_played: Option<i64>,
    pub runs_scored: Option<i64>,
    pub home_runs: Option<i64>,
    pub batting_avg: Option<f64>,
    pub obp: Option<f64>,
    pub slg: Option<f64>,
    pub stolen_bases: Option<i64>,
    pub caught_stealing: Option<i64>,
    // pitching
    pub wins: Option<i64>,
    pub losses: Option<i64>,
    pub win_percentage: Option<f64>,
    pub era: Option<f64>,
    pub strikeouts: Option<i64>,
    pub walks: Option<i64>,
    pub runs_allowed: Option<i64>,
    // fielding
    pub fielding_pct: Option<f64>,
    pub errors: Option<i64>,
    pub double_plays: Option<i64>,
    pub updated_at: String,
}

impl TeamSeasonStat {
    pub fn empty(season: i32, team_id: i64, updated_at: &str) -> Self {
        TeamSeasonStat {
            season,
            team_id,
            team_name: None,
            games_played: None,
            runs_scored: None,
            home_runs: None,
            batting_avg: None,
            obp: None,
            slg: None,
            stolen_bases: None,
            caught_stealing: None,
            wins: None,
            losses: None,
            win_percentage: None,
            era: None,
            strikeouts: None,
            walks: None,
            runs_allowed: None,
            fielding_pct: None,
            errors: None,
            double_plays: None,
            updated_at: updated_at.to_string(),
        }
    }
}

impl Record for Game {
    const TABLE: &'static str = "games";
    const CONFLICT_KEYS: &'static [&'static str] = &["game_id"];
}

impl Record for Standing {
    const TABLE: &'static str = "standings";
    const CONFLICT_KEYS: &'static [&'static str] = &["season", "team_id"];
}

impl Record for PlayerSeasonStat {
    const TABLE: &'static str = "player_season_stats";
    const CONFLICT_KEYS: &'static [&'static str] = &["season", "player_id"];
}

impl Record for ScheduleEntry {
    const TABLE: &'static str = "schedule";
    const CONFLICT_KEYS: &'static [&'static str] = &["game_id"];
}

impl Record for TeamSeasonStat {
    const TABLE: &'static str = "team_stats";
    const CONFLICT_KEYS: &'static [&'static str] = &["season", "team_id"];
}
