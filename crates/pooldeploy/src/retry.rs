//! Endpoint failover for JSON-RPC traffic.
//!
//! Every network has a primary RPC URL and optional fallbacks. Reads and raw broadcasts walk
//! that list in passes; what counts as "try the next one" depends on the [`RpcPolicy`].

use std::time::Duration;

/// How an endpoint's error is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcFailure {
    /// Timeouts, 5xx, rate limits, anything another endpoint might answer differently.
    Transient,
    /// The node already has this exact signed transaction.
    AlreadyAccepted,
    /// The node evaluated the request and said no. Every endpoint will say the same.
    Rejected,
}

const ACCEPTED_MARKERS: &[&str] = &["already known", "known transaction", "already imported"];

const REJECTED_MARKERS: &[&str] = &[
    "execution reverted",
    "nonce too low",
    "insufficient funds",
    "underpriced",
    "intrinsic gas too low",
    "exceeds block gas limit",
];

pub fn classify(err: &eyre::Report) -> RpcFailure {
    let msg = format!("{err:#}").to_lowercase();
    if ACCEPTED_MARKERS.iter().any(|m| msg.contains(m)) {
        RpcFailure::AlreadyAccepted
    } else if REJECTED_MARKERS.iter().any(|m| msg.contains(m)) {
        RpcFailure::Rejected
    } else {
        RpcFailure::Transient
    }
}

const READ_PAUSES: &[Duration] = &[
    Duration::from_millis(250),
    Duration::from_secs(1),
    Duration::from_secs(4),
];

// A mempool that dropped us usually needs longer than a flaky read.
const BROADCAST_PAUSES: &[Duration] = &[Duration::from_secs(2), Duration::from_secs(6)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcPolicy {
    /// `eth_call`, receipts, nonces, fee data, gas estimates.
    Read,
    /// `eth_sendRawTransaction` of a transaction that is already signed. Rebroadcasting the
    /// same bytes cannot double-apply it, so every endpoint gets a chance.
    Broadcast,
}

impl RpcPolicy {
    /// Pauses between passes over the endpoint list. One more pass than pauses.
    pub const fn pauses(self) -> &'static [Duration] {
        match self {
            Self::Read => READ_PAUSES,
            Self::Broadcast => BROADCAST_PAUSES,
        }
    }

    pub const fn passes(self) -> usize {
        self.pauses().len() + 1
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Broadcast => "broadcast",
        }
    }
}

/// `pause` plus up to a fifth of it again, so parallel runs against one node spread out.
fn jittered(pause: Duration) -> Duration {
    let ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX);
    let spread = ms / 5;
    if spread == 0 {
        return pause;
    }
    pause.saturating_add(Duration::from_millis(rand::random::<u64>() % (spread + 1)))
}

/// Ordered, de-duplicated RPC URLs; the primary comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints(Vec<String>);

impl Endpoints {
    pub fn new(primary: &str, fallbacks: &[String]) -> Self {
        let mut urls: Vec<String> = Vec::with_capacity(1 + fallbacks.len());
        for u in std::iter::once(primary).chain(fallbacks.iter().map(String::as_str)) {
            let u = u.trim();
            if !u.is_empty() && !urls.iter().any(|x| x == u) {
                urls.push(u.to_owned());
            }
        }
        Self(urls)
    }

    pub fn urls(&self) -> &[String] {
        &self.0
    }

    /// Run `op` against each endpoint until one answers.
    ///
    /// A [`RpcFailure::Rejected`] error ends the walk at once. Transient errors move on to
    /// the next endpoint, and a fully failed pass sleeps before the next one, up to
    /// [`RpcPolicy::passes`] passes.
    pub async fn failover<T, Fut>(
        &self,
        policy: RpcPolicy,
        what: &str,
        mut op: impl FnMut(&str) -> Fut,
    ) -> eyre::Result<T>
    where
        Fut: std::future::Future<Output = eyre::Result<T>>,
    {
        let Some(primary) = self.0.first() else {
            eyre::bail!("{what}: no rpc endpoints configured");
        };

        let mut last_err = None;
        let mut pauses = policy.pauses().iter();
        for pass in 1..=policy.passes() {
            for url in &self.0 {
                match op(url.as_str()).await {
                    Ok(v) => {
                        if url != primary {
                            tracing::info!(%url, pass, "{what}: served by fallback endpoint");
                        }
                        return Ok(v);
                    }
                    Err(e) if classify(&e) == RpcFailure::Rejected => {
                        return Err(e.wrap_err(format!("{what} rejected by {url}")));
                    }
                    Err(e) => {
                        tracing::debug!(
                            %url,
                            pass,
                            policy = policy.label(),
                            error = %format!("{e:#}"),
                            "{what}: endpoint failed"
                        );
                        last_err = Some(e);
                    }
                }
            }
            if let Some(pause) = pauses.next() {
                tokio::time::sleep(jittered(*pause)).await;
            }
        }

        let err = last_err.unwrap_or_else(|| eyre::eyre!("no attempt made"));
        Err(err.wrap_err(format!(
            "{what}: {} endpoint(s) failed over {} passes",
            self.0.len(),
            policy.passes()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn endpoints() -> Endpoints {
        Endpoints::new("https://a", &["https://b".into()])
    }

    #[test]
    fn urls_are_deduplicated_in_order() {
        let e = Endpoints::new(
            "https://a",
            &[" https://b ".into(), "https://a".into(), String::new()],
        );
        assert_eq!(e.urls(), ["https://a", "https://b"]);
    }

    #[test]
    fn node_errors_are_classified() {
        let dup = eyre::eyre!("server returned an error response: error code -32000: already known");
        assert_eq!(classify(&dup), RpcFailure::AlreadyAccepted);
        assert_eq!(
            classify(&eyre::eyre!("Nonce too low: next nonce 7, tx nonce 6")),
            RpcFailure::Rejected
        );
        assert_eq!(
            classify(&eyre::eyre!("error sending request: operation timed out")),
            RpcFailure::Transient
        );
    }

    #[test]
    fn broadcast_waits_longer_but_passes_less() {
        assert_eq!(RpcPolicy::Read.passes(), 4);
        assert_eq!(RpcPolicy::Broadcast.passes(), 3);
        let total = |p: RpcPolicy| p.pauses().iter().sum::<Duration>();
        assert!(total(RpcPolicy::Broadcast) > total(RpcPolicy::Read));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_walk_every_endpoint_each_pass() {
        let seen = RefCell::new(Vec::new());
        let res: eyre::Result<()> = endpoints()
            .failover(RpcPolicy::Broadcast, "eth_sendRawTransaction", |url| {
                seen.borrow_mut().push(url.to_owned());
                async { eyre::bail!("502 bad gateway") }
            })
            .await;
        let err = res.err().map(|e| format!("{e:#}")).unwrap_or_default();
        assert!(err.contains("2 endpoint(s) failed over 3 passes"), "{err}");
        assert_eq!(seen.borrow().len(), 6, "two endpoints, three passes");
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_stops_without_trying_fallbacks() {
        let calls = RefCell::new(0_u32);
        let res: eyre::Result<()> = endpoints()
            .failover(RpcPolicy::Read, "eth_call", |_| {
                *calls.borrow_mut() += 1;
                async { eyre::bail!("execution reverted: 33") }
            })
            .await;
        assert!(res.is_err(), "revert propagates");
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_answers_when_primary_is_down() -> eyre::Result<()> {
        let got = endpoints()
            .failover(RpcPolicy::Read, "eth_chainId", |url| {
                let healthy = url == "https://b";
                async move {
                    if healthy {
                        Ok(11_155_111_u64)
                    } else {
                        eyre::bail!("connection refused")
                    }
                }
            })
            .await?;
        assert_eq!(got, 11_155_111);
        Ok(())
    }

    #[tokio::test]
    async fn no_endpoints_is_an_error() {
        let res: eyre::Result<()> = Endpoints::new("  ", &[])
            .failover(RpcPolicy::Read, "eth_call", |_| async { Ok(()) })
            .await;
        assert!(res.is_err(), "nothing to call");
    }
}
