use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pulse_common::config::{LoginConfig, SiteConfig};
use pulse_common::{PulseError, Session};

use crate::pipeline::RunPhase;
use crate::progress::Progress;
use crate::traits::BrowserPage;
use crate::wait;

/// Drives an open browser page through the site's manual login and decides
/// when the page is really authenticated.
pub struct LoginWaiter {
    site: SiteConfig,
    config: LoginConfig,
}

impl LoginWaiter {
    pub fn new(site: SiteConfig, config: LoginConfig) -> Self {
        Self { site, config }
    }

    /// Open the login page and poll until the user has logged in.
    ///
    /// Authenticated means both: the URL has left the login/passport flow, and
    /// the authenticated-page marker is on the page. The URL check alone is
    /// fooled by intermediate redirects.
    pub async fn await_login(
        &self,
        page: &dyn BrowserPage,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Session, PulseError> {
        let login_url = &self.site.login_url;
        wait::or_cancel(cancel, page.navigate(login_url))
            .await?
            .map_err(|e| PulseError::Navigation {
                url: login_url.clone(),
                message: format!("{e:#}"),
            })?;
        progress
            .report(
                RunPhase::AwaitingLogin,
                "Opened the login page. Please log in manually in the browser window...",
            )
            .await;

        let polling = self.poll_until_authenticated(page, progress, cancel);
        let state = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, polling)
                .await
                .map_err(|_| PulseError::LoginTimeout(limit))??,
            None => polling.await?,
        };

        progress
            .report(RunPhase::AwaitingLogin, "Login detected, session captured")
            .await;
        Ok(Session::capture(state))
    }

    /// Replay a saved session into the page and check that the site accepts it.
    /// `Ok(false)` means the site rejected it and a fresh login is needed.
    pub async fn restore(
        &self,
        page: &dyn BrowserPage,
        session: &Session,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<bool, PulseError> {
        let home = &self.site.home_url;

        // Cookies can only be set for the domain currently loaded.
        self.open_home(page, cancel).await?;
        wait::sleep(self.config.restore_delay(), cancel).await?;

        if let Err(e) = wait::or_cancel(cancel, page.import_session(&session.state)).await? {
            warn!(error = %e, "Failed to import saved session");
            return Ok(false);
        }

        self.open_home(page, cancel).await?;
        wait::sleep(self.config.restore_delay(), cancel).await?;

        if self.marker_present(page, cancel).await? {
            progress
                .report(RunPhase::AwaitingLogin, "Saved login session restored")
                .await;
            Ok(true)
        } else {
            info!(home = %home, "Saved session rejected by site");
            progress
                .report(
                    RunPhase::AwaitingLogin,
                    "Saved login session is no longer valid, a new login is required",
                )
                .await;
            Ok(false)
        }
    }

    pub fn on_login_flow(&self, url: &str) -> bool {
        self.site
            .login_url_markers
            .iter()
            .any(|marker| url.contains(marker.as_str()))
    }

    async fn poll_until_authenticated(
        &self,
        page: &dyn BrowserPage,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, PulseError> {
        wait::sleep(self.config.initial_delay(), cancel).await?;

        let mut last_url = String::new();
        loop {
            wait::sleep(self.config.poll_interval(), cancel).await?;

            let url = match wait::or_cancel(cancel, page.current_url()).await? {
                Ok(url) => url,
                Err(e) => {
                    warn!(error = %e, "Failed to read current URL, retrying");
                    continue;
                }
            };

            if !self.on_login_flow(&url) && self.marker_present(page, cancel).await? {
                info!(url = %url, "Authenticated page reached");
                return wait::or_cancel(cancel, page.export_session())
                    .await?
                    .map_err(|e| PulseError::Session(format!("Failed to export session: {e:#}")));
            }

            if url != last_url {
                progress
                    .report(RunPhase::AwaitingLogin, format!("Current page: {url}"))
                    .await;
                last_url = url;
            }
        }
    }

    async fn marker_present(
        &self,
        page: &dyn BrowserPage,
        cancel: &CancellationToken,
    ) -> Result<bool, PulseError> {
        let selector = &self.site.authenticated_selector;
        match wait::or_cancel(cancel, page.query_texts(selector)).await? {
            Ok(found) => Ok(!found.is_empty()),
            Err(e) => {
                debug!(selector = %selector, error = %e, "Marker probe failed");
                Ok(false)
            }
        }
    }

    async fn open_home(
        &self,
        page: &dyn BrowserPage,
        cancel: &CancellationToken,
    ) -> Result<(), PulseError> {
        let home = &self.site.home_url;
        wait::or_cancel(cancel, page.navigate(home))
            .await?
            .map_err(|e| PulseError::Navigation {
                url: home.clone(),
                message: format!("{e:#}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use serde_json::json;
    use std::time::Duration;

    fn waiter(timeout_secs: u64) -> LoginWaiter {
        let config = test_config();
        let mut login = config.login.clone();
        login.timeout_secs = timeout_secs;
        LoginWaiter::new(config.site.clone(), login)
    }

    #[test]
    fn login_flow_detection_uses_markers() {
        let waiter = waiter(0);
        assert!(waiter.on_login_flow("https://weibo.com/login.php"));
        assert!(waiter.on_login_flow("https://passport.weibo.com/sso/signin"));
        assert!(!waiter.on_login_flow("https://weibo.com/u/123"));
    }

    #[tokio::test]
    async fn login_succeeds_once_url_and_marker_agree() {
        let page = MockPage::new()
            .with_urls(&[
                "https://weibo.com/login.php",
                "https://passport.weibo.com/visitor",
                "https://weibo.com/",
                "https://weibo.com/",
            ])
            .authenticated_after_polls(4)
            .with_session_state(json!([{ "name": "SUB", "value": "token" }]));
        let (progress, mut rx) = Progress::channel(64);

        let session = waiter(0)
            .await_login(&page, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(session.state, json!([{ "name": "SUB", "value": "token" }]));
        assert_eq!(page.url_polls(), 4);
        assert_eq!(page.navigations(), vec![TEST_LOGIN_URL.to_string()]);

        drop(progress);
        let mut messages = Vec::new();
        while let Some(update) = rx.recv().await {
            messages.push(update.message);
        }
        assert!(messages.iter().any(|m| m.contains("passport.weibo.com")));
        assert!(messages.last().unwrap().contains("Login detected"));
    }

    #[tokio::test]
    async fn redirect_without_marker_keeps_waiting() {
        // URL leaves the login flow on poll 1, marker only shows on poll 3.
        let page = MockPage::new()
            .with_urls(&["https://weibo.com/"])
            .authenticated_after_polls(3);

        waiter(0)
            .await_login(&page, &Progress::disabled(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(page.url_polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn login_wait_times_out() {
        let mut config = test_config();
        config.login.poll_interval_secs = 3;
        config.login.timeout_secs = 30;
        let waiter = LoginWaiter::new(config.site.clone(), config.login.clone());
        let page = MockPage::new().with_urls(&["https://weibo.com/login.php"]);

        let err = waiter
            .await_login(&page, &Progress::disabled(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PulseError::LoginTimeout(d) if d == Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn cancelled_login_wait_stops() {
        let page = MockPage::new().with_urls(&["https://weibo.com/login.php"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = waiter(0)
            .await_login(&page, &Progress::disabled(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PulseError::Cancelled));
    }

    #[tokio::test]
    async fn unreachable_login_page_is_navigation_error() {
        let page = MockPage::new().fail_navigation_to(TEST_LOGIN_URL);
        let err = waiter(0)
            .await_login(&page, &Progress::disabled(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::Navigation { .. }));
    }

    #[tokio::test]
    async fn accepted_session_is_restored() {
        let page = MockPage::new().accepts_sessions(true);
        let session = Session::capture(json!([{ "name": "SUB", "value": "token" }]));

        let restored = waiter(0)
            .restore(&page, &session, &Progress::disabled(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(restored);
        assert_eq!(page.imported_state(), Some(session.state.clone()));
        assert_eq!(
            page.navigations(),
            vec![TEST_HOME_URL.to_string(), TEST_HOME_URL.to_string()]
        );
    }

    #[tokio::test]
    async fn rejected_session_reports_false() {
        let page = MockPage::new().accepts_sessions(false);
        let session = Session::capture(json!([]));

        let restored = waiter(0)
            .restore(&page, &session, &Progress::disabled(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!restored);
    }
}
