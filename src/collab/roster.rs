use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PeerAuthorizer;
use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,
    pub user_name: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Team {
    name: String,
    members: Vec<Member>,
}

/// In-memory team membership.
#[derive(Debug, Default)]
pub struct TeamRoster {
    teams: RwLock<HashMap<String, Team>>,
}

impl TeamRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a team with `user_name` as its admin. Returns `(team_id, user_id)`.
    pub fn create_team(&self, team_name: &str, user_name: &str) -> Result<(String, String)> {
        let team_name = required(team_name, "team name")?;
        let user_name = required(user_name, "user name")?;

        let team_id = format!("team_{}_{}", Utc::now().timestamp(), hex_id(8));
        let admin = new_member(user_name, MemberRole::Admin);
        let user_id = admin.user_id.clone();

        self.teams.write().insert(
            team_id.clone(),
            Team {
                name: team_name.to_string(),
                members: vec![admin],
            },
        );
        tracing::info!(team_id = %team_id, team_name, user_id = %user_id, "Team created");
        Ok((team_id, user_id))
    }

    /// Add `user_name` to an existing team. Returns the new user id.
    pub fn join_team(&self, team_id: &str, user_name: &str) -> Result<String> {
        let user_name = required(user_name, "user name")?;

        let mut teams = self.teams.write();
        let team = teams
            .get_mut(team_id)
            .ok_or_else(|| CoordinatorError::TeamNotFound(team_id.to_string()))?;
        let member = new_member(user_name, MemberRole::Member);
        let user_id = member.user_id.clone();
        team.members.push(member);
        tracing::info!(team_id, user_id = %user_id, "Member joined team");
        Ok(user_id)
    }

    pub fn members(&self, team_id: &str) -> Result<Vec<Member>> {
        self.teams
            .read()
            .get(team_id)
            .map(|t| t.members.clone())
            .ok_or_else(|| CoordinatorError::TeamNotFound(team_id.to_string()))
    }

    pub fn team_name(&self, team_id: &str) -> Option<String> {
        self.teams.read().get(team_id).map(|t| t.name.clone())
    }
}

impl PeerAuthorizer for TeamRoster {
    fn is_authorized_peer(&self, team_id: &str, user_id: &str) -> bool {
        self.teams
            .read()
            .get(team_id)
            .is_some_and(|t| t.members.iter().any(|m| m.user_id == user_id))
    }
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoordinatorError::InvalidInput(format!("{} is required", what)));
    }
    Ok(trimmed)
}

fn new_member(user_name: &str, role: MemberRole) -> Member {
    Member {
        user_id: format!("user_{}", hex_id(12)),
        user_name: user_name.to_string(),
        role,
        joined_at: Utc::now(),
    }
}

fn hex_id(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len].to_string()
}
