//! Terminal front end
//!
//! [`TerminalPrompter`] renders the selection menus with dialoguer and
//! [`IndicatifProgress`] renders category progress bars. Both sit behind the
//! library's seams, so nothing else in the crate knows a terminal exists.

use crate::config::Config;
use crate::progress::{ProgressSink, ScopeId};
use crate::scope::{MenuChoice, Prompter};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, MultiSelect, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Interactive menus on the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    /// Create a prompter rendering to the current terminal
    pub fn new() -> Self {
        Self
    }

    fn multi_pick(&self, prompt: &str, items: &[String]) -> Vec<String> {
        if items.is_empty() {
            return Vec::new();
        }
        let picked = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(items)
            .interact()
            .unwrap_or_default();
        picked.into_iter().map(|i| items[i].clone()).collect()
    }
}

impl Prompter for TerminalPrompter {
    fn main_menu(&self) -> MenuChoice {
        const ITEMS: [(&str, MenuChoice); 7] = [
            ("Download everything from all users", MenuChoice::AllUsers),
            ("Download from a list", MenuChoice::Lists),
            ("Download from selected users", MenuChoice::Custom),
            ("Download a single post", MenuChoice::SinglePost),
            ("Download purchased tab", MenuChoice::PurchasedTab),
            ("Edit configuration", MenuChoice::EditConfig),
            ("Exit", MenuChoice::Exit),
        ];
        let labels: Vec<&str> = ITEMS.iter().map(|(label, _)| *label).collect();
        // A closed terminal ends the session rather than looping forever
        let index = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Select an option")
            .items(&labels)
            .default(0)
            .interact()
            .unwrap_or(ITEMS.len() - 1);
        ITEMS[index].1
    }

    fn pick_lists(&self, names: &[String]) -> Vec<String> {
        self.multi_pick("Select lists", names)
    }

    fn pick_users(&self, usernames: &[String]) -> Vec<String> {
        self.multi_pick("Select users", usernames)
    }

    fn post_url(&self) -> String {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Post URL")
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default()
    }

    fn edit_config(&self, config: &Config) -> Config {
        let mut edited = config.clone();
        let toggles: [(&str, &mut bool); 11] = [
            ("Download posts", &mut edited.categories.download_posts),
            ("Download paid posts", &mut edited.categories.download_paid_posts),
            ("Download archived posts", &mut edited.categories.download_archived),
            ("Download streams", &mut edited.categories.download_streams),
            ("Download stories", &mut edited.categories.download_stories),
            ("Download highlights", &mut edited.categories.download_highlights),
            ("Download messages", &mut edited.categories.download_messages),
            ("Download paid messages", &mut edited.categories.download_paid_messages),
            ("Download avatar and header", &mut edited.download_avatar_header_photo),
            ("Include expired subscriptions", &mut edited.include_expired_subscriptions),
            ("Show scrape size", &mut edited.show_scrape_size),
        ];
        let labels: Vec<&str> = toggles.iter().map(|(label, _)| *label).collect();
        let defaults: Vec<bool> = toggles.iter().map(|(_, value)| **value).collect();
        let Ok(picked) = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt("Enabled settings (space toggles, enter confirms)")
            .items(&labels)
            .defaults(&defaults)
            .interact()
        else {
            return edited;
        };
        for (index, (_, value)) in toggles.into_iter().enumerate() {
            *value = picked.contains(&index);
        }
        edited
    }
}

/// Progress bars for category runs
#[derive(Debug, Default)]
pub struct IndicatifProgress {
    next_id: AtomicU64,
    bars: Mutex<HashMap<u64, ProgressBar>>,
}

impl IndicatifProgress {
    /// Create a bar-rendering sink
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for IndicatifProgress {
    fn open_scope(&self, label: &str, max: u64) -> ScopeId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bar = ProgressBar::new(max);
        let style = ProgressStyle::with_template(
            "{msg:20} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
        bar.set_style(style);
        bar.set_message(label.to_string());
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(id, bar);
        }
        ScopeId(id)
    }

    fn advance(&self, scope: ScopeId, delta: u64) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(&scope.0) {
                bar.inc(delta);
            }
        }
    }

    fn close_scope(&self, scope: ScopeId) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bar) = bars.remove(&scope.0) {
                bar.finish_and_clear();
            }
        }
    }
}
