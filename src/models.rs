use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Text-backed enum stored as its snake_case name.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                $name::parse(raw).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} value {raw:?}", stringify!($name)).into())
                })
            }
        }
    };
}

text_enum!(Role {
    Admin => "admin",
    Member => "member",
});

text_enum!(Position {
    Goalkeeper => "goalkeeper",
    Defender => "defender",
    Midfielder => "midfielder",
    Forward => "forward",
    Any => "any",
});

text_enum!(MatchdayStatus {
    Scheduled => "scheduled",
    Completed => "completed",
    Cancelled => "cancelled",
});

text_enum!(GameStatus {
    Scheduled => "scheduled",
    Finished => "finished",
});

text_enum!(EventKind {
    Goal => "goal",
    OwnGoal => "own_goal",
});

text_enum!(EntityType {
    Group => "group",
    Member => "member",
    Player => "player",
    Matchday => "matchday",
    Team => "team",
    Game => "game",
    GameEvent => "game_event",
    Shootout => "shootout",
});

text_enum!(Action {
    Create => "create",
    Update => "update",
    Delete => "delete",
    Restore => "restore",
    Join => "join",
    Leave => "leave",
    Remove => "remove",
    RoleChange => "role_change",
    Reorder => "reorder",
    Generate => "generate",
    RegenerateInvite => "regenerate_invite",
});

impl Default for Position {
    fn default() -> Self {
        Position::Any
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub invite_code: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: Group,
    pub role: Role,
    pub member_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub group_id: i64,
    pub user_id: i64,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub position: Position,
    pub skill: i64,
    pub user_id: Option<i64>,
    pub sort_order: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Matchday {
    pub id: i64,
    pub group_id: i64,
    pub title: String,
    pub scheduled_at: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub team_count: i64,
    pub status: MatchdayStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub id: i64,
    pub matchday_id: i64,
    pub name: String,
    pub color: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamRoster {
    #[serde(flatten)]
    pub team: Team,
    pub players: Vec<Player>,
    pub total_skill: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchdayDetail {
    #[serde(flatten)]
    pub matchday: Matchday,
    pub teams: Vec<TeamRoster>,
    pub games: Vec<Game>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    pub id: i64,
    pub matchday_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: i64,
    pub away_score: i64,
    pub status: GameStatus,
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Game {
    pub fn is_level(&self) -> bool {
        self.home_score == self.away_score
    }

    pub fn score_for(&self, team_id: i64) -> Option<i64> {
        if team_id == self.home_team_id {
            Some(self.home_score)
        } else if team_id == self.away_team_id {
            Some(self.away_score)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, team_id: i64) -> Option<i64> {
        if team_id == self.home_team_id {
            Some(self.away_team_id)
        } else if team_id == self.away_team_id {
            Some(self.home_team_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameEvent {
    pub id: i64,
    pub game_id: i64,
    pub kind: EventKind,
    pub player_id: i64,
    pub team_id: i64,
    pub assist_player_id: Option<i64>,
    pub minute: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PenaltyKick {
    pub id: i64,
    pub round: i64,
    pub team_id: i64,
    pub player_id: i64,
    pub scored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PenaltyShootout {
    pub id: i64,
    pub game_id: i64,
    pub home_score: i64,
    pub away_score: i64,
    pub winner_team_id: Option<i64>,
    pub kicks: Vec<PenaltyKick>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameDetail {
    #[serde(flatten)]
    pub game: Game,
    pub events: Vec<GameEvent>,
    pub shootout: Option<PenaltyShootout>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub id: i64,
    pub group_id: i64,
    pub actor_user_id: i64,
    pub actor_name: String,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub action: Action,
    pub changes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
