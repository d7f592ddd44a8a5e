//! Run-scope selection
//!
//! Turns either the interactive menu or the non-interactive config into an
//! immutable [`RunScope`] for one pass. Prompting goes through the
//! [`Prompter`] seam so the selection loop is testable without a terminal.

use crate::api::PlatformApi;
use crate::config::Config;
use crate::error::{Result, ScopeError};
use crate::types::{RunScope, ScopeMode, ScopedUser};
use std::sync::Arc;

/// Top-level menu entries of the interactive session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    /// Download everything from every subscribed creator
    AllUsers,
    /// Restrict the pass to creators on selected lists
    Lists,
    /// Hand-pick creators
    Custom,
    /// Download one post addressed by URL
    SinglePost,
    /// Walk the purchased tab
    PurchasedTab,
    /// Edit the configuration and skip this pass
    EditConfig,
    /// Leave the session
    Exit,
}

/// Terminal prompting seam.
///
/// Implementations render menus; the selection logic stays in
/// [`ScopeSelector`] so it can be driven by a scripted prompter in tests.
pub trait Prompter: Send + Sync {
    /// Present the main menu
    fn main_menu(&self) -> MenuChoice;

    /// Pick zero or more list names from the account's lists
    fn pick_lists(&self, names: &[String]) -> Vec<String>;

    /// Pick zero or more creators from the subscriber set
    fn pick_users(&self, usernames: &[String]) -> Vec<String>;

    /// Ask for a single-post URL
    fn post_url(&self) -> String;

    /// Walk the user through editing the configuration
    fn edit_config(&self, config: &Config) -> Config;
}

/// What one trip through the selection state machine produced
#[derive(Debug, Clone)]
pub enum Selection {
    /// A resolved scope; the controller runs it
    Scope(RunScope),
    /// The configuration was edited; the controller persists it and starts
    /// a fresh selection without running any category
    ConfigEdited(Config),
    /// End the session
    Exit,
}

/// Parse a single-post URL of the form
/// `https://onlyfans.com/<post-id>/<creator>`.
pub fn parse_post_url(url: &str) -> std::result::Result<(i64, String), ScopeError> {
    let stripped = url
        .trim()
        .strip_prefix("https://onlyfans.com/")
        .ok_or_else(|| ScopeError::InvalidPostUrl(url.to_string()))?;
    let mut segments = stripped.trim_end_matches('/').splitn(2, '/');
    let post_id = segments
        .next()
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ScopeError::InvalidPostUrl(url.to_string()))?;
    let creator = segments
        .next()
        .filter(|s| !s.is_empty() && !s.contains('/'))
        .ok_or_else(|| ScopeError::InvalidPostUrl(url.to_string()))?;
    Ok((post_id, creator.to_string()))
}

/// Resolves the scope for each pass, interactively or from static config
pub struct ScopeSelector {
    api: Arc<dyn PlatformApi>,
    prompter: Arc<dyn Prompter>,
}

impl ScopeSelector {
    /// Wire a selector over the API and a prompter
    pub fn new(api: Arc<dyn PlatformApi>, prompter: Arc<dyn Prompter>) -> Self {
        Self { api, prompter }
    }

    /// Compute the scope from static config, with no prompting.
    ///
    /// Precedence: purchased-tab flag, then named list, then all users. An
    /// unknown list name is fatal here since nobody can re-prompt.
    pub async fn resolve_non_interactive(
        &self,
        config: &Config,
        subscribers: &[ScopedUser],
    ) -> Result<RunScope> {
        if config.non_interactive_mode_purchased_tab {
            return Ok(RunScope {
                mode: ScopeMode::PurchasedTab,
                users: Vec::new(),
            });
        }
        if !config.non_interactive_mode_list_name.is_empty() {
            let users = self
                .list_subset(&[config.non_interactive_mode_list_name.clone()], subscribers)
                .await?;
            return Ok(RunScope {
                mode: ScopeMode::ListSubset,
                users,
            });
        }
        Ok(RunScope::all(subscribers.to_vec()))
    }

    /// Drive the interactive menu until a terminal selection is made.
    ///
    /// Invalid single-post URLs and unknown creators re-prompt; the scope
    /// never changes on invalid input.
    pub async fn select(&self, config: &Config, subscribers: &[ScopedUser]) -> Result<Selection> {
        loop {
            match self.prompter.main_menu() {
                MenuChoice::AllUsers => {
                    return Ok(Selection::Scope(RunScope::all(subscribers.to_vec())));
                }
                MenuChoice::Lists => {
                    let lists = self.api.fetch_lists().await?;
                    let mut names: Vec<String> = lists.keys().cloned().collect();
                    names.sort();
                    let picked = self.prompter.pick_lists(&names);
                    if picked.is_empty() {
                        continue;
                    }
                    let users = self.list_subset(&picked, subscribers).await?;
                    return Ok(Selection::Scope(RunScope {
                        mode: ScopeMode::ListSubset,
                        users,
                    }));
                }
                MenuChoice::Custom => {
                    let usernames: Vec<String> =
                        subscribers.iter().map(|u| u.username.clone()).collect();
                    let picked = self.prompter.pick_users(&usernames);
                    if picked.is_empty() {
                        continue;
                    }
                    let users = subscribers
                        .iter()
                        .filter(|u| picked.contains(&u.username))
                        .cloned()
                        .collect();
                    return Ok(Selection::Scope(RunScope {
                        mode: ScopeMode::CustomSubset,
                        users,
                    }));
                }
                MenuChoice::SinglePost => {
                    let url = self.prompter.post_url();
                    let (post_id, creator) = match parse_post_url(&url) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            tracing::warn!(error = %e, "invalid post URL");
                            continue;
                        }
                    };
                    let Some(user) = subscribers.iter().find(|u| u.username == creator) else {
                        tracing::warn!(creator = %creator, "creator not in subscriber set");
                        continue;
                    };
                    return Ok(Selection::Scope(RunScope {
                        mode: ScopeMode::SinglePost(post_id),
                        users: vec![user.clone()],
                    }));
                }
                MenuChoice::PurchasedTab => {
                    return Ok(Selection::Scope(RunScope {
                        mode: ScopeMode::PurchasedTab,
                        users: Vec::new(),
                    }));
                }
                MenuChoice::EditConfig => {
                    return Ok(Selection::ConfigEdited(self.prompter.edit_config(config)));
                }
                MenuChoice::Exit => return Ok(Selection::Exit),
            }
        }
    }

    /// Resolve list names to the subscribed creators they contain
    async fn list_subset(
        &self,
        names: &[String],
        subscribers: &[ScopedUser],
    ) -> Result<Vec<ScopedUser>> {
        let lists = self.api.fetch_lists().await?;
        let mut members: Vec<String> = Vec::new();
        for name in names {
            let id = lists
                .get(name)
                .ok_or_else(|| ScopeError::UnknownList(name.clone()))?;
            for username in self.api.fetch_list_members(*id).await? {
                if !members.contains(&username) {
                    members.push(username);
                }
            }
        }
        Ok(subscribers
            .iter()
            .filter(|u| members.contains(&u.username))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{MockApi, ScriptedPrompter, scoped_user};
    use std::collections::HashMap;

    fn subscribers() -> Vec<ScopedUser> {
        vec![scoped_user("alice", 1), scoped_user("bob", 2)]
    }

    #[test]
    fn test_parse_post_url_accepts_canonical_form() {
        let (id, creator) = parse_post_url("https://onlyfans.com/1234567/alice").unwrap();
        assert_eq!(id, 1234567);
        assert_eq!(creator, "alice");
        let (id, _) = parse_post_url("https://onlyfans.com/99/bob/").unwrap();
        assert_eq!(id, 99);
    }

    #[test]
    fn test_parse_post_url_rejects_malformed() {
        for bad in [
            "https://onlyfans.com/alice/1234",
            "https://onlyfans.com/1234",
            "https://example.com/1234/alice",
            "not a url",
            "",
        ] {
            assert!(
                matches!(parse_post_url(bad), Err(ScopeError::InvalidPostUrl(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_all_users_scope() {
        let api = Arc::new(MockApi::new());
        let prompter = Arc::new(ScriptedPrompter::with_choices(&[MenuChoice::AllUsers]));
        let selector = ScopeSelector::new(api, prompter);

        let selection = selector
            .select(&Config::default(), &subscribers())
            .await
            .unwrap();
        match selection {
            Selection::Scope(scope) => {
                assert_eq!(scope.mode, ScopeMode::AllUsers);
                assert_eq!(scope.users.len(), 2);
            }
            other => panic!("expected scope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_scope_filters_subscribers() {
        let api = Arc::new(MockApi::new());
        api.set_lists(HashMap::from([("friends".to_string(), 10)]));
        api.set_list_members(10, vec!["alice".to_string(), "stranger".to_string()]);
        let prompter = Arc::new(ScriptedPrompter::with_choices(&[MenuChoice::Lists]));
        prompter.push_list_pick(&["friends"]);
        let selector = ScopeSelector::new(api, prompter);

        let selection = selector
            .select(&Config::default(), &subscribers())
            .await
            .unwrap();
        match selection {
            Selection::Scope(scope) => {
                assert_eq!(scope.mode, ScopeMode::ListSubset);
                assert_eq!(scope.users, vec![scoped_user("alice", 1)]);
            }
            other => panic!("expected scope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_post_url_reprompts() {
        let api = Arc::new(MockApi::new());
        let prompter = Arc::new(ScriptedPrompter::with_choices(&[
            MenuChoice::SinglePost,
            MenuChoice::SinglePost,
            MenuChoice::SinglePost,
        ]));
        prompter.push_url("https://onlyfans.com/not-a-post");
        prompter.push_url("https://onlyfans.com/77/stranger");
        prompter.push_url("https://onlyfans.com/77/alice");
        let selector = ScopeSelector::new(api, prompter);

        let selection = selector
            .select(&Config::default(), &subscribers())
            .await
            .unwrap();
        match selection {
            Selection::Scope(scope) => {
                assert_eq!(scope.mode, ScopeMode::SinglePost(77));
                assert_eq!(scope.users, vec![scoped_user("alice", 1)]);
            }
            other => panic!("expected scope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_edit_config_returns_edited_config() {
        let api = Arc::new(MockApi::new());
        let prompter = Arc::new(ScriptedPrompter::with_choices(&[MenuChoice::EditConfig]));
        let selector = ScopeSelector::new(api, prompter);

        let selection = selector
            .select(&Config::default(), &subscribers())
            .await
            .unwrap();
        match selection {
            Selection::ConfigEdited(config) => assert!(config.show_scrape_size),
            other => panic!("expected edited config, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_interactive_precedence() {
        let api = Arc::new(MockApi::new());
        api.set_lists(HashMap::from([("vip".to_string(), 3)]));
        api.set_list_members(3, vec!["bob".to_string()]);
        let prompter = Arc::new(ScriptedPrompter::default());
        let selector = ScopeSelector::new(api, prompter);

        let mut config = Config::default();
        config.non_interactive_mode_purchased_tab = true;
        config.non_interactive_mode_list_name = "vip".to_string();
        let scope = selector
            .resolve_non_interactive(&config, &subscribers())
            .await
            .unwrap();
        assert_eq!(scope.mode, ScopeMode::PurchasedTab);

        config.non_interactive_mode_purchased_tab = false;
        let scope = selector
            .resolve_non_interactive(&config, &subscribers())
            .await
            .unwrap();
        assert_eq!(scope.mode, ScopeMode::ListSubset);
        assert_eq!(scope.users, vec![scoped_user("bob", 2)]);

        config.non_interactive_mode_list_name.clear();
        let scope = selector
            .resolve_non_interactive(&config, &subscribers())
            .await
            .unwrap();
        assert_eq!(scope.mode, ScopeMode::AllUsers);
    }

    #[tokio::test]
    async fn test_unknown_list_is_fatal_without_a_prompt() {
        let api = Arc::new(MockApi::new());
        let prompter = Arc::new(ScriptedPrompter::default());
        let selector = ScopeSelector::new(api, prompter);

        let mut config = Config::default();
        config.non_interactive_mode_list_name = "missing".to_string();
        let err = selector
            .resolve_non_interactive(&config, &subscribers())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Scope(ScopeError::UnknownList(_))
        ));
    }
}
