use crate::mlb::error::FetchError;
use crate::mlb::params::*;

use chrono::NaiveDate;
use core::fmt;
use log::debug;
use serde_json::Value;
use std::{fmt::Display, time::{Duration, Instant}};

/// The fixed set of stats API paths this crate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Schedule,
    Standings,
    Stats,
    TeamRoster(i64),
    TeamStats,
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Schedule => write!(f, "/schedule"),
            Endpoint::Standings => write!(f, "/standings"),
            Endpoint::Stats => write!(f, "/stats"),
            Endpoint::TeamRoster(team_id) => write!(f, "/teams/{}/roster", team_id),
            Endpoint::TeamStats => write!(f, "/teams/stats"),
        }
    }
}

/// Blocking client for the stats API. One agent is shared by every request in
/// a run so connections and the timeout are set up once.
pub struct MLBClient {
    agent: ureq::Agent,
    base_url: String,
}

impl MLBClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("mlbsync/", env!("CARGO_PKG_VERSION")))
            .build();
        MLBClient { agent, base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn fetch(&self, endpoint: Endpoint, params: &[&dyn MLBParam]) -> Result<Value, FetchError> {
        let endpoint_url = format!("{}{}", self.base_url, endpoint);
        let mut request = self
            .agent
            .get(&endpoint_url)
            .set("Accept", "application/json, text/plain, */*")
            .set("Cache-Control", "no-cache");
        for param in params {
            for (key, value) in param.query_pairs() {
                request = request.query(key, &value);
            }
        }

        let query = params.iter().map(|p| p.to_string()).collect::<Vec<String>>().join("&");
        debug!("GET {}?{}", endpoint_url, query);
        let fetch_start = Instant::now();
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                return Err(FetchError::Status {
                    endpoint: endpoint.to_string(),
                    status,
                    body: response.into_string().unwrap_or_default(),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(FetchError::Transport {
                    endpoint: endpoint.to_string(),
                    source: Box::new(transport),
                });
            }
        };
        let json = response
            .into_json::<Value>()
            .map_err(|source| FetchError::Decode { endpoint: endpoint.to_string(), source })?;
        debug!("{} took {:?}", endpoint, fetch_start.elapsed());
        Ok(json)
    }
}

pub trait MLBEndpoint {
    fn endpoint(&self) -> Endpoint;
    fn params(&self) -> Vec<&dyn MLBParam>;
    fn send_request(&self, client: &MLBClient) -> Result<Value, FetchError> {
        client.fetch(self.endpoint(), &self.params())
    }
}

pub struct ScheduleByDate {
    pub sport_id: SportID,
    pub date: GameDate,
}

pub struct ScheduleByDateRange {
    pub sport_id: SportID,
    pub range: DateRange,
    pub hydrate: Hydrate,
}

pub struct StandingsByLeague {
    pub league_ids: LeagueIDs,
    pub season: Season,
    pub hydrate: Hydrate,
}

pub struct SeasonStatsByGroup {
    pub stats_type: StatsType,
    pub group: StatGroup,
    pub sport_id: SportID,
    pub season: Season,
}

pub struct TeamRoster {
    pub team_id: i64,
    pub season: Season,
}

pub struct TeamStatsBySeason {
    pub season: Season,
    pub sport_ids: SportIDs,
    pub groups: StatGroups,
}

impl ScheduleByDate {
    pub fn new(sport_id: SportID, date: NaiveDate) -> Self {
        ScheduleByDate { sport_id, date: GameDate(date) }
    }
}

impl ScheduleByDateRange {
    pub fn new(sport_id: SportID, start: NaiveDate, days: i64) -> Self {
        ScheduleByDateRange {
            sport_id,
            range: DateRange::days_from(start, days),
            hydrate: Hydrate(vec!["probablePitcher", "venue"]),
        }
    }
}

impl StandingsByLeague {
    pub fn new(league_ids: LeagueIDs, season: i32) -> Self {
        StandingsByLeague { league_ids, season: Season(season), hydrate: Hydrate(vec!["team", "division"]) }
    }
}

impl SeasonStatsByGroup {
    pub fn new(stats_type: StatsType, group: StatGroup, season: i32) -> Self {
        SeasonStatsByGroup { stats_type, group, sport_id: Default::default(), season: Season(season) }
    }
}

impl TeamRoster {
    pub fn new(team_id: i64, season: i32) -> Self {
        TeamRoster { team_id, season: Season(season) }
    }
}

impl TeamStatsBySeason {
    pub fn new(season: i32, groups: StatGroups) -> Self {
        TeamStatsBySeason { season: Season(season), sport_ids: Default::default(), groups }
    }
}

impl MLBEndpoint for ScheduleByDate {
    fn endpoint(&self) -> Endpoint { Endpoint::Schedule }
    fn params(&self) -> Vec<&dyn MLBParam> {
        vec![&self.sport_id as &dyn MLBParam, &self.date]
    }
}

impl MLBEndpoint for ScheduleByDateRange {
    fn endpoint(&self) -> Endpoint { Endpoint::Schedule }
    fn params(&self) -> Vec<&dyn MLBParam> {
        vec![&self.sport_id as &dyn MLBParam, &self.range, &self.hydrate]
    }
}

impl MLBEndpoint for StandingsByLeague {
    fn endpoint(&self) -> Endpoint { Endpoint::Standings }
    fn params(&self) -> Vec<&dyn MLBParam> {
        vec![&self.league_ids as &dyn MLBParam, &self.season, &self.hydrate]
    }
}

impl MLBEndpoint for SeasonStatsByGroup {
    fn endpoint(&self) -> Endpoint { Endpoint::Stats }
    fn params(&self) -> Vec<&dyn MLBParam> {
        vec![&self.stats_type as &dyn MLBParam, &self.group, &self.sport_id, &self.season]
    }
}

impl MLBEndpoint for TeamRoster {
    fn endpoint(&self) -> Endpoint { Endpoint::TeamRoster(self.team_id) }
    fn params(&self) -> Vec<&dyn MLBParam> {
        vec![&self.season as &dyn MLBParam]
    }
}

impl MLBEndpoint for TeamStatsBySeason {
    fn endpoint(&self) -> Endpoint { Endpoint::TeamStats }
    fn params(&self) -> Vec<&dyn MLBParam> {
        vec![&self.season as &dyn MLBParam, &self.sport_ids, &self.groups]
    }
}
