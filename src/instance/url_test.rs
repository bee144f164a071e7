use std::time::Duration;

use super::box_instance::BoxInstance;

/// Wait after launching helpers so they are listening before the core dials them.
const HELPER_WARMUP: Duration = Duration::from_millis(500);

impl BoxInstance {
    /// Measure latency to `link` through this instance's chain.
    ///
    /// Runs the whole lifecycle and always closes afterwards. The core always binds in
    /// direct capture mode; `under_vpn` only reaches the helper configurations, so their
    /// sockets stay outside the running tunnel.
    pub async fn url_test(
        self,
        link: &str,
        timeout: Duration,
        under_vpn: bool,
    ) -> anyhow::Result<u32> {
        let mut instance = self.for_test();
        let result = instance.run_url_test(link, timeout, under_vpn).await;
        let report = instance.close().await;
        if !report.is_clean() {
            tracing::warn!(
                "url test teardown had {} failure(s)",
                report.failures.len()
            );
        }
        result
    }

    async fn run_url_test(
        &mut self,
        link: &str,
        timeout: Duration,
        under_vpn: bool,
    ) -> anyhow::Result<u32> {
        self.build_config()?;
        self.prepare(under_vpn).await?;
        self.start().await?;

        if self.deps.supervisor.process_count() > 0 {
            tokio::time::sleep(HELPER_WARMUP).await;
        }
        self.deps
            .core
            .update_root_certs(&self.context().cert_provider)
            .await?;

        let Some(core) = self.core.as_ref() else {
            anyhow::bail!("core not loaded");
        };
        let latency = core.url_test(link, timeout).await?;
        tracing::debug!("url test to {} took {}ms", link, latency);
        Ok(latency)
    }
}
