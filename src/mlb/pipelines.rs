use crate::mlb::config::Config;
use crate::mlb::db::{upsert_records, UpsertSink};
use crate::mlb::endpoints::*;
use crate::mlb::models::{NormalizedBatch, Record};
use crate::mlb::normalize;
use crate::mlb::params::{SportID, StatGroup, StatsType};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// Everything a pipeline needs for one run.
pub struct SyncContext<'a> {
    pub config: &'a Config,
    pub client: &'a MLBClient,
    pub sink: &'a dyn UpsertSink,
    pub run_started: DateTime<Utc>,
}

impl<'a> SyncContext<'a> {
    pub fn new(config: &'a Config, client: &'a MLBClient, sink: &'a dyn UpsertSink) -> Self {
        SyncContext { config, client, sink, run_started: Utc::now() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub fetched: usize,
    pub rejected: usize,
    pub written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Games,
    Standings,
    PlayerStats,
    Schedule,
    TeamStats,
}

impl Pipeline {
    pub const ALL: [Pipeline; 5] = [
        Pipeline::Games,
        Pipeline::Standings,
        Pipeline::PlayerStats,
        Pipeline::Schedule,
        Pipeline::TeamStats,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Pipeline::Games => "games",
            Pipeline::Standings => "standings",
            Pipeline::PlayerStats => "player-stats",
            Pipeline::Schedule => "schedule",
            Pipeline::TeamStats => "team-stats",
        }
    }

    pub fn run(&self, ctx: &SyncContext) -> Result<PipelineReport> {
        match self {
            Pipeline::Games => fetch_games(ctx),
            Pipeline::Standings => fetch_standings(ctx),
            Pipeline::PlayerStats => fetch_player_stats(ctx),
            Pipeline::Schedule => fetch_schedule(ctx),
            Pipeline::TeamStats => fetch_team_stats(ctx),
        }
    }
}

pub struct PipelineOutcome {
    pub pipeline: Pipeline,
    pub result: Result<PipelineReport>,
}

/// Runs each pipeline in order. A failing pipeline is logged and does not stop
/// the ones after it.
pub fn run_pipelines(ctx: &SyncContext, pipelines: &[Pipeline]) -> Vec<PipelineOutcome> {
    pipelines
        .iter()
        .map(|&pipeline| {
            let start = Instant::now();
            info!("Running {} pipeline", pipeline.name());
            let result = pipeline.run(ctx);
            match &result {
                Ok(report) => info!(
                    "{} finished in {:?}: {} fetched, {} rejected, {} written",
                    pipeline.name(),
                    start.elapsed(),
                    report.fetched,
                    report.rejected,
                    report.written
                ),
                Err(e) => error!("{} pipeline failed: {:#}", pipeline.name(), e),
            }
            PipelineOutcome { pipeline, result }
        })
        .collect()
}

fn write_batch<R: Record>(ctx: &SyncContext, batch: &NormalizedBatch<R>) -> Result<PipelineReport> {
    if batch.rejected > 0 {
        warn!("{} {} records rejected for a missing natural key", batch.rejected, R::TABLE);
    }
    let summary = upsert_records(ctx.sink, &batch.records)?;
    Ok(PipelineReport {
        fetched: batch.fetched(),
        rejected: batch.rejected + summary.dropped,
        written: summary.written,
    })
}

/// Today's games.
pub fn fetch_games(ctx: &SyncContext) -> Result<PipelineReport> {
    let schedule = ScheduleByDate::new(SportID::MLB, ctx.config.today)
        .send_request(ctx.client)
        .context("fetching today's schedule")?;
    let batch = normalize::games_from_schedule(&schedule);
    write_batch(ctx, &batch)
}

/// Current standings for both leagues.
pub fn fetch_standings(ctx: &SyncContext) -> Result<PipelineReport> {
    let standings = StandingsByLeague::new(Default::default(), ctx.config.season)
        .send_request(ctx.client)
        .context("fetching standings")?;
    let batch = normalize::standings_from_response(&standings, ctx.config.season);
    write_batch(ctx, &batch)
}

/// Season batting lines. Lines without a team get one from the team rosters.
pub fn fetch_player_stats(ctx: &SyncContext) -> Result<PipelineReport> {
    let season = ctx.config.season;
    let stats = SeasonStatsByGroup::new(StatsType::Season, StatGroup::Hitting, season)
        .send_request(ctx.client)
        .context("fetching player hitting stats")?;
    let mut batch = normalize::player_stats_from_response(&stats, season);

    if batch.records.iter().any(|line| line.team_id.is_none()) {
        let team_ids: BTreeSet<i64> = batch.records.iter().filter_map(|line| line.team_id).collect();
        let rosters = fetch_roster_teams(ctx, &team_ids)?;
        for line in batch.records.iter_mut().filter(|line| line.team_id.is_none()) {
            line.team_id = rosters.get(&line.player_id).copied();
            if line.team_id.is_none() {
                warn!("No team found for player {} ({:?})", line.player_id, line.player_name);
            }
        }
    }
    write_batch(ctx, &batch)
}

/// Player id to team id, built from one roster call per team.
fn fetch_roster_teams(ctx: &SyncContext, team_ids: &BTreeSet<i64>) -> Result<HashMap<i64, i64>> {
    info!("Resolving teams from {} rosters", team_ids.len());
    let mut rosters = Vec::with_capacity(team_ids.len());
    for &team_id in team_ids {
        let roster = TeamRoster::new(team_id, ctx.config.season)
            .send_request(ctx.client)
            .with_context(|| format!("fetching roster for team {}", team_id))?;
        rosters.push((team_id, normalize::roster_players(&roster)));
    }
    Ok(assign_roster_teams(&rosters))
}

/// A player on several rosters goes to the team that lists them as active,
/// otherwise to the first team that lists them.
fn assign_roster_teams(rosters: &[(i64, Vec<(i64, bool)>)]) -> HashMap<i64, i64> {
    let mut player_teams: HashMap<i64, (i64, bool)> = HashMap::new();
    for (team_id, players) in rosters {
        for &(player_id, active) in players {
            match player_teams.get(&player_id).copied() {
                None => {
                    player_teams.insert(player_id, (*team_id, active));
                }
                Some((kept, kept_active)) => {
                    let replace = active && !kept_active;
                    let (chosen, other) = if replace { (*team_id, kept) } else { (kept, *team_id) };
                    warn!(
                        "Player {} is on the rosters of teams {} and {}, using {}",
                        player_id, chosen, other, chosen
                    );
                    if replace {
                        player_teams.insert(player_id, (*team_id, active));
                    }
                }
            }
        }
    }
    player_teams.into_iter().map(|(player, (team, _))| (player, team)).collect()
}

/// Games in the forward schedule window.
pub fn fetch_schedule(ctx: &SyncContext) -> Result<PipelineReport> {
    let schedule = ScheduleByDateRange::new(SportID::MLB, ctx.config.today, ctx.config.schedule_days)
        .send_request(ctx.client)
        .context("fetching schedule window")?;
    let batch = normalize::schedule_from_response(&schedule);
    write_batch(ctx, &batch)
}

/// Team hitting, pitching and fielding totals merged into one row per team.
pub fn fetch_team_stats(ctx: &SyncContext) -> Result<PipelineReport> {
    let season = ctx.config.season;
    info!("Fetching team stats for {}", season);
    let response = TeamStatsBySeason::new(season, Default::default())
        .send_request(ctx.client)
        .context("fetching team stats")?;
    let updated_at = ctx.run_started.to_rfc3339();
    let batch = normalize::team_stats_from_response(&response, season, &updated_at);
    write_batch(ctx, &batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlb::db::Row;
    use crate::mlb::error::SinkError;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct UpsertCall {
        table: String,
        rows: Vec<Row>,
        conflict_keys: Vec<String>,
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: RefCell<Vec<UpsertCall>>,
        fail_table: Option<&'static str>,
    }

    impl UpsertSink for RecordingSink {
        fn write_batch(&self, table: &str, rows: &[&Row], conflict_keys: &[&str]) -> Result<usize, SinkError> {
            if self.fail_table == Some(table) {
                return Err(SinkError::Transport {
                    table: table.to_string(),
                    rows: rows.len(),
                    message: "connection reset".to_string(),
                });
            }
            self.calls.borrow_mut().push(UpsertCall {
                table: table.to_string(),
                rows: rows.iter().map(|r| (*r).clone()).collect(),
                conflict_keys: conflict_keys.iter().map(|k| k.to_string()).collect(),
            });
            Ok(rows.len())
        }
    }

    fn config_for(server: &mockito::Server) -> Config {
        Config {
            api_base_url: format!("{}/api/v1", server.url()),
            http_timeout: Duration::from_secs(5),
            season: 2024,
            today: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
            schedule_days: 7,
        }
    }

    fn client_for(config: &Config) -> MLBClient {
        MLBClient::new(&config.api_base_url, config.http_timeout)
    }

    fn two_game_schedule() -> String {
        json!({
            "dates": [{
                "date": "2024-07-04",
                "games": [
                    {"gamePk": 101, "gameDate": "2024-07-04T17:05:00Z",
                     "status": {"detailedState": "Scheduled"},
                     "teams": {"home": {"team": {"name": "A"}}, "away": {"team": {"name": "B"}}}},
                    {"gamePk": 102, "gameDate": "2024-07-04T17:10:00Z",
                     "status": {"detailedState": "Final"},
                     "teams": {"home": {"team": {"name": "C"}, "score": 5},
                               "away": {"team": {"name": "D"}, "score": 3}}}
                ]
            }]
        })
        .to_string()
    }

    #[test]
    fn games_pipeline_writes_one_batch() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v1/schedule")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("sportId".into(), "1".into()),
                Matcher::UrlEncoded("date".into(), "2024-07-04".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(two_game_schedule())
            .create();

        let config = config_for(&server);
        let client = client_for(&config);
        let sink = RecordingSink::default();
        let ctx = SyncContext::new(&config, &client, &sink);

        let report = fetch_games(&ctx).unwrap();
        mock.assert();
        assert_eq!(report, PipelineReport { fetched: 2, rejected: 0, written: 2 });

        let calls = sink.calls.borrow();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.table, "games");
        assert_eq!(call.conflict_keys, vec!["game_id".to_string()]);
        assert_eq!(call.rows.len(), 2);

        let first = &call.rows[0];
        assert_eq!(first["game_id"], json!(101));
        assert_eq!(first["status"], json!("Scheduled"));
        assert_eq!(first["home_team"], json!("A"));
        assert_eq!(first["away_team"], json!("B"));
        assert_eq!(first["home_score"], Value::Null);
        assert_eq!(first["away_score"], Value::Null);

        let second = &call.rows[1];
        assert_eq!(second["game_id"], json!(102));
        assert_eq!(second["status"], json!("Final"));
        assert_eq!(second["home_score"], json!(5));
        assert_eq!(second["away_score"], json!(3));
    }

    #[test]
    fn failed_fetch_does_not_stop_later_pipelines() {
        let mut server = mockito::Server::new();
        let _games = server
            .mock("GET", "/api/v1/schedule")
            .match_query(Matcher::UrlEncoded("date".into(), "2024-07-04".into()))
            .with_status(500)
            .create();
        let _standings = server
            .mock("GET", "/api/v1/standings")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"records": [{"division": {"name": "American League East"},
                    "teamRecords": [{"team": {"id": 147, "name": "New York Yankees"},
                        "wins": 50, "losses": 35, "winningPercentage": ".588", "gamesBack": "-"}]}]})
                .to_string(),
            )
            .create();

        let config = config_for(&server);
        let client = client_for(&config);
        let sink = RecordingSink::default();
        let ctx = SyncContext::new(&config, &client, &sink);

        let outcomes = run_pipelines(&ctx, &[Pipeline::Games, Pipeline::Standings]);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_err());
        let standings = outcomes[1].result.as_ref().unwrap();
        assert_eq!(standings.written, 1);

        let calls = sink.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].table, "standings");
        assert_eq!(calls[0].conflict_keys, vec!["season".to_string(), "team_id".to_string()]);
        assert_eq!(calls[0].rows[0]["season"], json!(2024));
        assert_eq!(calls[0].rows[0]["games_back"], json!(0.0));
    }

    #[test]
    fn write_failure_is_reported_with_table() {
        let mut server = mockito::Server::new();
        let _games = server
            .mock("GET", "/api/v1/schedule")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(two_game_schedule())
            .create();

        let config = config_for(&server);
        let client = client_for(&config);
        let sink = RecordingSink { fail_table: Some("games"), ..Default::default() };
        let ctx = SyncContext::new(&config, &client, &sink);

        let outcomes = run_pipelines(&ctx, &[Pipeline::Games, Pipeline::Schedule]);
        let err = outcomes[0].result.as_ref().unwrap_err();
        assert!(err.to_string().contains("2 rows into games"));

        let schedule = outcomes[1].result.as_ref().unwrap();
        assert_eq!(schedule.written, 2);
        assert_eq!(sink.calls.borrow()[0].table, "schedule");
    }

    #[test]
    fn player_stats_fill_missing_team_from_rosters() {
        let mut server = mockito::Server::new();
        let _stats = server
            .mock("GET", "/api/v1/stats")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("stats".into(), "season".into()),
                Matcher::UrlEncoded("group".into(), "hitting".into()),
                Matcher::UrlEncoded("season".into(), "2024".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"stats": [{"splits": [
                    {"player": {"id": 592450, "fullName": "Aaron Judge"}, "team": {"id": 147},
                     "stat": {"gamesPlayed": 158, "avg": ".322", "ops": "1.159", "homeRuns": 58,
                              "rbi": 144, "strikeOuts": 171}},
                    {"player": {"id": 665742, "fullName": "Juan Soto"},
                     "stat": {"gamesPlayed": 157, "avg": ".288"}},
                    {"player": {"fullName": "Nobody"}, "stat": {}}
                ]}]})
                .to_string(),
            )
            .create();
        let roster = server
            .mock("GET", "/api/v1/teams/147/roster")
            .match_query(Matcher::UrlEncoded("season".into(), "2024".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"roster": [{"person": {"id": 592450}}, {"person": {"id": 665742}}]}).to_string())
            .expect(1)
            .create();

        let config = config_for(&server);
        let client = client_for(&config);
        let sink = RecordingSink::default();
        let ctx = SyncContext::new(&config, &client, &sink);

        let report = fetch_player_stats(&ctx).unwrap();
        roster.assert();
        assert_eq!(report, PipelineReport { fetched: 3, rejected: 1, written: 2 });

        let calls = sink.calls.borrow();
        assert_eq!(calls[0].table, "player_season_stats");
        assert_eq!(calls[0].conflict_keys, vec!["season".to_string(), "player_id".to_string()]);
        assert_eq!(calls[0].rows[0]["ops"], json!(1.159));
        assert_eq!(calls[0].rows[1]["player_id"], json!(665742));
        assert_eq!(calls[0].rows[1]["team_id"], json!(147));
        assert_eq!(calls[0].rows[1]["hr"], json!(0));
    }

    #[test]
    fn active_roster_entry_wins_a_collision() {
        let rosters = vec![
            (110, vec![(1, false), (2, true)]),
            (147, vec![(1, true), (2, true), (3, false)]),
        ];
        let teams = assign_roster_teams(&rosters);
        assert_eq!(teams[&1], 147);
        assert_eq!(teams[&2], 110);
        assert_eq!(teams[&3], 147);
    }

    #[test]
    fn postponed_game_is_written_once_per_window() {
        let mut server = mockito::Server::new();
        let _schedule = server
            .mock("GET", "/api/v1/schedule")
            .match_query(Matcher::UrlEncoded("endDate".into(), "2024-07-11".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"dates": [
                    {"date": "2024-07-04", "games": [{"gamePk": 745001, "officialDate": "2024-07-04"}]},
                    {"date": "2024-07-06", "games": [
                        {"gamePk": 745001, "officialDate": "2024-07-06"},
                        {"gamePk": 745002, "officialDate": "2024-07-06"}
                    ]}
                ]})
                .to_string(),
            )
            .create();

        let config = config_for(&server);
        let client = client_for(&config);
        let sink = RecordingSink::default();
        let ctx = SyncContext::new(&config, &client, &sink);

        let report = fetch_schedule(&ctx).unwrap();
        assert_eq!(report, PipelineReport { fetched: 3, rejected: 0, written: 2 });
        let calls = sink.calls.borrow();
        assert_eq!(calls[0].rows.len(), 2);
        assert_eq!(calls[0].rows[0]["game_id"], json!(745001));
        assert_eq!(calls[0].rows[0]["date"], json!("2024-07-06"));
    }

    #[derive(serde::Serialize)]
    struct LooseGame {
        game_id: Option<i64>,
        status: &'static str,
    }

    impl Record for LooseGame {
        const TABLE: &'static str = "games";
        const CONFLICT_KEYS: &'static [&'static str] = &["game_id"];
    }

    #[test]
    fn sink_drops_count_as_rejected() {
        let server = mockito::Server::new();
        let config = config_for(&server);
        let client = client_for(&config);
        let sink = RecordingSink::default();
        let ctx = SyncContext::new(&config, &client, &sink);

        let batch = NormalizedBatch {
            records: vec![
                LooseGame { game_id: Some(101), status: "Final" },
                LooseGame { game_id: None, status: "Final" },
            ],
            rejected: 1,
        };
        let report = write_batch(&ctx, &batch).unwrap();
        assert_eq!(report, PipelineReport { fetched: 3, rejected: 2, written: 1 });
        assert_eq!(sink.calls.borrow()[0].rows.len(), 1);
    }

    #[test]
    fn team_stats_stamp_the_run_time() {
        let mut server = mockito::Server::new();
        let _teams = server
            .mock("GET", "/api/v1/teams/stats")
            .match_query(Matcher::UrlEncoded("group".into(), "hitting,pitching,fielding".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"stats": [
                    {"group": {"displayName": "hitting"},
                     "splits": [{"team": {"id": 119, "name": "Los Angeles Dodgers"}, "stat": {"avg": ".258"}}]},
                    {"group": {"displayName": "pitching"},
                     "splits": [{"team": {"id": 119, "name": "Los Angeles Dodgers"}, "stat": {"era": "3.90"}}]}
                ]})
                .to_string(),
            )
            .create();

        let config = config_for(&server);
        let client = client_for(&config);
        let sink = RecordingSink::default();
        let ctx = SyncContext::new(&config, &client, &sink);

        fetch_team_stats(&ctx).unwrap();
        let calls = sink.calls.borrow();
        assert_eq!(calls[0].table, "team_stats");
        let row = &calls[0].rows[0];
        assert_eq!(row["batting_avg"], json!(0.258));
        assert_eq!(row["era"], json!(3.9));
        assert_eq!(row["fielding_pct"], Value::Null);
        assert_eq!(row["updated_at"], json!(ctx.run_started.to_rfc3339()));
    }
}
