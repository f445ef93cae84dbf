use core::fmt;
use std::fmt::Display;

use chrono::{Datelike, Duration, NaiveDate, Utc};

/// A query parameter understood by the stats API.
///
/// Each parameter renders as one or more `key=value` pairs. `Display` gives the
/// joined query fragment, which is what ends up in the logs.
pub trait MLBParam: Display {
    fn query_pairs(&self) -> Vec<(&'static str, String)>;
}

fn write_pairs(f: &mut fmt::Formatter, pairs: &[(&'static str, String)]) -> fmt::Result {
    for (pos, (key, value)) in pairs.iter().enumerate() {
        if pos > 0 {
            write!(f, "&")?;
        }
        write!(f, "{}={}", key, value)?;
    }
    Ok(())
}

macro_rules! display_via_pairs {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write_pairs(f, &self.query_pairs())
                }
            }
        )*
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SportID {
    MLB,
}

impl SportID {
    fn id(&self) -> u32 {
        match self {
            SportID::MLB => 1,
        }
    }
}

/// `sportIds=` spelling used by the team stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SportIDs(pub SportID);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeagueID {
    American,
    National,
}

impl LeagueID {
    fn id(&self) -> u32 {
        match self {
            LeagueID::American => 103,
            LeagueID::National => 104,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeagueIDs(pub Vec<LeagueID>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameDate(pub NaiveDate);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Season(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatGroup {
    Hitting,
    Pitching,
    Fielding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatGroups(pub Vec<StatGroup>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsType {
    Season,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hydrate(pub Vec<&'static str>);

impl StatGroup {
    pub fn name(&self) -> &'static str {
        match self {
            StatGroup::Hitting => "hitting",
            StatGroup::Pitching => "pitching",
            StatGroup::Fielding => "fielding",
        }
    }
}

impl DateRange {
    /// Window starting at `start` and ending `days` days later, inclusive.
    pub fn days_from(start: NaiveDate, days: i64) -> Self {
        DateRange { start, end: start + Duration::days(days) }
    }
}

impl MLBParam for SportID {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![("sportId", self.id().to_string())]
    }
}

impl MLBParam for SportIDs {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![("sportIds", self.0.id().to_string())]
    }
}

impl MLBParam for LeagueIDs {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let ids = self.0.iter().map(|l| l.id().to_string()).collect::<Vec<String>>();
        vec![("leagueId", ids.join(","))]
    }
}

impl MLBParam for GameDate {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![("date", self.0.format("%Y-%m-%d").to_string())]
    }
}

impl MLBParam for DateRange {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("startDate", self.start.format("%Y-%m-%d").to_string()),
            ("endDate", self.end.format("%Y-%m-%d").to_string()),
        ]
    }
}

impl MLBParam for Season {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![("season", self.0.to_string())]
    }
}

impl MLBParam for StatGroup {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![("group", self.name().to_string())]
    }
}

impl MLBParam for StatGroups {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let names = self.0.iter().map(|g| g.name()).collect::<Vec<&str>>();
        vec![("group", names.join(","))]
    }
}

impl MLBParam for StatsType {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            StatsType::Season => vec![("stats", "season".to_string())],
        }
    }
}

impl MLBParam for Hydrate {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![("hydrate", self.0.join(","))]
    }
}

display_via_pairs!(
    SportID, SportIDs, LeagueIDs, GameDate, DateRange, Season, StatGroup, StatGroups,
    StatsType, Hydrate,
);

impl Default for SportID {
    fn default() -> Self { SportID::MLB }
}

impl Default for SportIDs {
    fn default() -> Self { SportIDs(SportID::MLB) }
}

impl Default for LeagueIDs {
    fn default() -> Self { LeagueIDs(vec![LeagueID::American, LeagueID::National]) }
}

impl Default for GameDate {
    fn default() -> Self { GameDate(Utc::now().date_naive()) }
}

impl Default for Season {
    fn default() -> Self { Season(Utc::now().year()) }
}

impl Default for StatsType {
    fn default() -> Self { StatsType::Season }
}

impl Default for StatGroups {
    fn default() -> Self {
        StatGroups(vec![StatGroup::Hitting, StatGroup::Pitching, StatGroup::Fielding])
    }
}
