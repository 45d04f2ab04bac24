use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::brain::{Decision, OptionResolver, SelectOptionRequest};
use crate::diff::new_lines_or_empty;
use crate::dom;
use crate::driver::PageDriver;
use crate::error::BridgeError;
use crate::selector::build_selector;
use crate::types::{Command, TagDescriptor};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Short wait for the direct find-and-click before scrolling.
    pub direct_wait: Duration,
    /// Bounded wait for an element to attach before fill/select.
    pub attach_wait: Duration,
    pub scroll_max_steps: u32,
    pub scroll_backoff: Duration,
    pub scroll_backoff_cap: Duration,
    pub decision_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            direct_wait: Duration::from_millis(1000),
            attach_wait: Duration::from_millis(10_000),
            scroll_max_steps: 200,
            scroll_backoff: Duration::from_millis(16),
            scroll_backoff_cap: Duration::from_millis(250),
            decision_timeout: Duration::from_secs(30),
        }
    }
}

/// What a successfully executed command did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    /// The checkbox was already checked, so nothing was clicked.
    AlreadyChecked,
    /// Values the page actually applied to a `<select>`.
    Selected(Vec<String>),
    /// The backend could not resolve a dropdown option.
    NoSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropdownState {
    Idle,
    SnapshotBefore,
    Clicked,
    SnapshotAfter,
    Diffed,
    AwaitingDecision,
    Selecting,
    Done,
    Error,
}

/// Tracks the click-dropdown-and-select run so failures report where they happened.
struct DropdownRun<'a> {
    work_id: &'a str,
    state: DropdownState,
}

impl<'a> DropdownRun<'a> {
    fn new(work_id: &'a str) -> Self {
        Self {
            work_id,
            state: DropdownState::Idle,
        }
    }

    fn advance(&mut self, next: DropdownState) {
        debug!("[{}] dropdown {:?} -> {:?}", self.work_id, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: &BridgeError) {
        warn!("[{}] dropdown failed in {:?}: {}", self.work_id, self.state, error);
        self.state = DropdownState::Error;
    }
}

/// Performs DOM commands against a session's page.
pub struct CommandExecutor {
    resolver: Arc<dyn OptionResolver>,
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(resolver: Arc<dyn OptionResolver>, config: ExecutorConfig) -> Self {
        Self { resolver, config }
    }

    /// Run one DOM command. `EndProcess` carries no DOM work and is a no-op here.
    pub async fn execute(&self, page: &dyn PageDriver, command: &Command) -> Result<Outcome, BridgeError> {
        match command {
            Command::FillText { selector, value, .. } => {
                self.fill_text(page, selector, value).await?;
                Ok(Outcome::Done)
            }
            Command::FillCheckbox { selector, .. } => self.fill_checkbox(page, selector).await,
            Command::FillRadio { selector, .. } | Command::Click { selector, .. } => {
                self.scroll_and_click(page, selector).await?;
                Ok(Outcome::Done)
            }
            Command::ClickDropdownAndSelect { work_id, tag } => {
                self.click_dropdown_and_select(page, work_id, tag).await
            }
            Command::SelectByValue { tag, selector, .. } => {
                let applied = self.select_by_value(page, selector, &tag.select_values()).await?;
                Ok(Outcome::Selected(applied))
            }
            Command::EndProcess { .. } => Ok(Outcome::Done),
        }
    }

    pub async fn fill_text(&self, page: &dyn PageDriver, selector: &str, value: &str) -> Result<(), BridgeError> {
        page.wait_for_selector(selector, self.config.attach_wait).await?;
        page.set_value(selector, value).await?;
        debug!("Filled {}", selector);
        Ok(())
    }

    /// Click the checkbox only if it is not already checked.
    pub async fn fill_checkbox(&self, page: &dyn PageDriver, selector: &str) -> Result<Outcome, BridgeError> {
        page.wait_for_selector(selector, self.config.attach_wait).await?;
        if page.is_checked(selector).await? {
            debug!("Checkbox {} already checked", selector);
            return Ok(Outcome::AlreadyChecked);
        }
        page.click(selector).await?;
        debug!("Checked {}", selector);
        Ok(Outcome::Done)
    }

    pub async fn select_by_value(
        &self,
        page: &dyn PageDriver,
        selector: &str,
        values: &[String],
    ) -> Result<Vec<String>, BridgeError> {
        page.wait_for_selector(selector, self.config.attach_wait).await?;
        let applied = page.select_values(selector, values).await?;
        if applied != values {
            warn!(
                "Select {} applied {:?}, requested {:?}",
                selector, applied, values
            );
        } else {
            debug!("Selected {:?} in {}", applied, selector);
        }
        Ok(applied)
    }

    /// Click an element that may be outside the initial viewport.
    ///
    /// Tries a short direct wait first, then scrolls one viewport at a time,
    /// probing for the element after each step, until it is found or the
    /// page's scroll range is exhausted.
    pub async fn scroll_and_click(&self, page: &dyn PageDriver, selector: &str) -> Result<(), BridgeError> {
        match page.wait_for_selector(selector, self.config.direct_wait).await {
            Ok(()) => match page.click(selector).await {
                Ok(()) => {
                    debug!("Clicked {} directly", selector);
                    return Ok(());
                }
                Err(e) => debug!("Direct click on {} failed, scrolling: {}", selector, e),
            },
            Err(e) => debug!("{} not immediately available, scrolling: {}", selector, e),
        }

        self.scroll_into_view(page, selector).await?;
        page.click(selector).await?;
        debug!("Clicked {} after scrolling", selector);
        Ok(())
    }

    async fn scroll_into_view(&self, page: &dyn PageDriver, selector: &str) -> Result<(), BridgeError> {
        let mut offset = 0.0;
        let mut backoff = self.config.scroll_backoff;

        for step in 0..self.config.scroll_max_steps {
            let probe = page.probe_selector(selector).await?;
            if probe.found {
                debug!("Located {} after {} scroll step(s)", selector, step);
                return Ok(());
            }

            offset += probe.viewport_height.max(1.0);
            if offset >= probe.scroll_height {
                return Err(BridgeError::SelectorNotFound(selector.to_string()));
            }

            page.scroll_to(offset).await?;
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.scroll_backoff_cap);
        }

        Err(BridgeError::SelectorNotFound(selector.to_string()))
    }

    /// Open a dropdown, diff the revealed text, ask the backend which option
    /// to pick and click it.
    pub async fn click_dropdown_and_select(
        &self,
        page: &dyn PageDriver,
        work_id: &str,
        tag: &TagDescriptor,
    ) -> Result<Outcome, BridgeError> {
        let mut run = DropdownRun::new(work_id);
        let result = self.run_dropdown(&mut run, page, tag).await;
        if let Err(e) = &result {
            run.fail(e);
        }
        result
    }

    async fn run_dropdown(
        &self,
        run: &mut DropdownRun<'_>,
        page: &dyn PageDriver,
        tag: &TagDescriptor,
    ) -> Result<Outcome, BridgeError> {
        let before = dom::extract_text_lines(page).await;
        run.advance(DropdownState::SnapshotBefore);

        let selector = build_selector(tag);
        self.scroll_and_click(page, &selector).await?;
        run.advance(DropdownState::Clicked);

        let after = dom::extract_text_lines(page).await;
        let new_html = dom::extract_html(page).await;
        run.advance(DropdownState::SnapshotAfter);

        if before.is_none() || after.is_none() {
            warn!("[{}] missing text snapshot, treating as no new options", run.work_id);
        }
        let options = new_lines_or_empty(before.as_deref(), after.as_deref());
        run.advance(DropdownState::Diffed);
        info!("[{}] dropdown revealed {} option(s)", run.work_id, options.len());

        let request = SelectOptionRequest {
            options,
            work_id: run.work_id.to_string(),
            description: tag.description(),
            new_html,
        };
        run.advance(DropdownState::AwaitingDecision);
        let decision = tokio::time::timeout(
            self.config.decision_timeout,
            self.resolver.select_option(&request),
        )
        .await
        .map_err(|_| {
            BridgeError::Timeout(format!(
                "select_option gave no answer within {}s",
                self.config.decision_timeout.as_secs()
            ))
        })??;

        let element = match decision {
            Decision::Unsuccessful => {
                info!("[{}] backend could not resolve an option", run.work_id);
                run.advance(DropdownState::Done);
                return Ok(Outcome::NoSelection);
            }
            Decision::Select(element) => element,
        };

        run.advance(DropdownState::Selecting);
        let option_selector = build_selector(&element);
        self.scroll_and_click(page, &option_selector).await?;
        run.advance(DropdownState::Done);
        info!("[{}] selected {}", run.work_id, option_selector);
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
