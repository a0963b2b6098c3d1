//! The IAM subsystem orchestrator.
//!
//! [`IamSys`] is constructed once at startup and handed to request-serving
//! code. Its lifecycle is explicit:
//!
//! ```text
//! Uninitialized ──init()──▶ Loading ──▶ Ready ──shutdown()──▶ ShuttingDown
//!        ▲                     │
//!        └──── init error ─────┘
//! ```
//!
//! `init` loads or bootstraps the document, builds the [`PolicyEngine`] and
//! [`CredentialStore`], applies the document once, and then starts two
//! background tasks that both re-apply it: a watch on the document (only
//! the coordination backend has a change stream) and a fixed-interval
//! ticker.
//!
//! Refreshes are upserts. Accounts removed from the document keep their
//! in-memory entries until they are explicitly removed or the process
//! restarts.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use iamsys_authn::TokenValidator;
use iamsys_storage::{ChangeListener, ConfigStore, WatchHandle};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{BootstrapOptions, IamSysConfig},
    credential::Credential,
    credential_store::CredentialStore,
    document::{IamDocument, IdentityType},
    error::{IamError, Result},
    manager::IamConfigManager,
    policy::{Args, Policy, PolicyEngine},
};

/// Lifecycle state of an [`IamSys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IamState {
    /// Constructed, `init` not yet called or last `init` failed.
    Uninitialized,
    /// `init` is running.
    Loading,
    /// Serving decisions.
    Ready,
    /// `shutdown` was called.
    ShuttingDown,
}

struct Components {
    identity: IdentityType,
    policy: PolicyEngine,
    credentials: CredentialStore,
}

struct ResolvedValidator {
    url: String,
    validator: Arc<TokenValidator>,
}

#[derive(Default)]
struct Tasks {
    ticker: Option<JoinHandle<()>>,
    watch: Option<WatchHandle>,
}

struct Inner {
    /// `None` for an unconfigured subsystem.
    manager: Option<IamConfigManager>,
    config: IamSysConfig,
    bootstrap: BootstrapOptions,
    state: RwLock<IamState>,
    components: RwLock<Option<Arc<Components>>>,
    validator: RwLock<Option<ResolvedValidator>>,
    document: RwLock<Option<Arc<IamDocument>>>,
    refresh_count: AtomicU64,
    cancel: CancellationToken,
    tasks: Mutex<Tasks>,
}

/// Process-wide IAM subsystem.
///
/// Cheap to clone; clones share state.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use iamsys_iam::{BootstrapOptions, IamSys, IamSysConfig, policy::Args};
/// use iamsys_storage::{ConfigStore, MemoryObjectLayer};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = ConfigStore::Object(Arc::new(MemoryObjectLayer::new()));
/// let iam = IamSys::new(store, IamSysConfig::default(), BootstrapOptions::from_env()?);
/// iam.init().await?;
///
/// let request = Args::builder().account("alice").action("s3:GetObject").bucket("photos").build();
/// let allowed = iam.is_allowed(&request).await;
///
/// iam.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IamSys {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for IamSys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IamSys")
            .field("configured", &self.is_configured())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl IamSys {
    /// Creates a subsystem reading its document from `store`.
    ///
    /// Nothing is loaded until [`init`](Self::init).
    #[must_use]
    pub fn new(store: ConfigStore, config: IamSysConfig, bootstrap: BootstrapOptions) -> Self {
        let manager =
            IamConfigManager::new(store, config.config_path.clone(), config.store_timeout);
        Self::from_parts(Some(manager), config, bootstrap)
    }

    /// Creates a subsystem with no backing configuration.
    ///
    /// It allows every request. Intended for single-user and test
    /// deployments; never use it where access control is expected.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self::from_parts(None, IamSysConfig::default(), BootstrapOptions::default())
    }

    fn from_parts(
        manager: Option<IamConfigManager>,
        config: IamSysConfig,
        bootstrap: BootstrapOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                manager,
                config,
                bootstrap,
                state: RwLock::new(IamState::Uninitialized),
                components: RwLock::new(None),
                validator: RwLock::new(None),
                document: RwLock::new(None),
                refresh_count: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    /// Returns `false` for a subsystem built with [`unconfigured`](Self::unconfigured).
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.manager.is_some()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> IamState {
        *self.inner.state.read()
    }

    /// The subsystem configuration.
    #[must_use]
    pub fn settings(&self) -> &IamSysConfig {
        &self.inner.config
    }

    /// The most recently applied document.
    #[must_use]
    pub fn document(&self) -> Option<Arc<IamDocument>> {
        self.inner.document.read().clone()
    }

    /// Number of completed refreshes, including the one run by `init`.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_count.load(Ordering::Relaxed)
    }

    /// Loads the document and starts serving.
    ///
    /// A missing document is bootstrapped from the [`BootstrapOptions`].
    /// On an unconfigured subsystem this only marks it ready.
    ///
    /// # Errors
    ///
    /// - [`IamError::ConfigInvalid`] if called twice, if the configuration
    ///   is invalid, or if `openid` identity is requested without a
    ///   coordination store or key set URL
    /// - any load error other than `NotFound`
    /// - [`IamError::Token`] if the signing key cannot be fetched
    ///
    /// On error the subsystem returns to [`IamState::Uninitialized`].
    #[tracing::instrument(skip(self))]
    pub async fn init(&self) -> Result<()> {
        {
            let mut state = self.inner.state.write();
            if *state != IamState::Uninitialized {
                return Err(IamError::config_invalid(format!(
                    "IAM subsystem cannot be initialised from state {:?}",
                    *state
                )));
            }
            *state = IamState::Loading;
        }

        let Some(manager) = &self.inner.manager else {
            *self.inner.state.write() = IamState::Ready;
            tracing::warn!("IAM subsystem is unconfigured; all requests will be allowed");
            return Ok(());
        };

        if let Err(err) = self.load(manager).await {
            tracing::error!(error = %err, "IAM subsystem failed to initialise");
            *self.inner.components.write() = None;
            *self.inner.validator.write() = None;
            *self.inner.state.write() = IamState::Uninitialized;
            return Err(err);
        }

        *self.inner.state.write() = IamState::Ready;
        self.start_background(manager);
        tracing::info!("IAM subsystem ready");
        Ok(())
    }

    async fn load(&self, manager: &IamConfigManager) -> Result<()> {
        let config = &self.inner.config;
        config.validate()?;

        let document = manager.load_or_bootstrap(&self.inner.bootstrap).await?;
        let identity = document.identity.kind.clone();

        if identity == IdentityType::OpenId {
            if !manager.store().is_distributed() {
                return Err(IamError::config_invalid(
                    "openid identity requires a coordination store for credential distribution",
                ));
            }
            let url = document.jwks_url().ok_or_else(|| {
                IamError::config_invalid("openid identity requires identity.openid.jwt.webKeyURL")
            })?;
            let validator = TokenValidator::from_url(url).await?;
            *self.inner.validator.write() =
                Some(ResolvedValidator { url: url.to_owned(), validator: Arc::new(validator) });
        }

        let policy = PolicyEngine::from_config(&document.policy, config.decision_timeout)?;
        let credentials = match manager.store().coordination() {
            Some(store) => CredentialStore::distributed(store, config.watch_backoff.clone()).await?,
            None => CredentialStore::local(),
        };
        tracing::debug!(
            %identity,
            decider = policy.decider_name(),
            distributed = credentials.is_distributed(),
            "IAM components constructed"
        );

        let components = Arc::new(Components { identity, policy, credentials });
        *self.inner.components.write() = Some(Arc::clone(&components));
        self.apply(&components, document).await;
        Ok(())
    }

    fn start_background(&self, manager: &IamConfigManager) {
        let listener = Arc::new(DocumentListener { inner: Arc::downgrade(&self.inner) });
        let backoff = self.inner.config.watch_backoff.clone();
        let watch = manager.store().watch(manager.path(), backoff, listener);

        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        let interval = self.inner.config.refresh_interval;
        let ticker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {},
                }
                let Some(inner) = weak.upgrade() else { break };
                if let Err(err) = (IamSys { inner }).refresh().await {
                    tracing::warn!(error = %err, "periodic IAM refresh failed");
                }
            }
            tracing::debug!("IAM refresh ticker stopped");
        });

        let mut tasks = self.inner.tasks.lock();
        tasks.ticker = Some(ticker);
        tasks.watch = Some(watch);
    }

    fn components(&self) -> Option<Arc<Components>> {
        self.inner.components.read().clone()
    }

    fn ready_components(&self) -> Result<Arc<Components>> {
        if self.state() != IamState::Ready {
            return Err(IamError::NotReady);
        }
        self.components().ok_or(IamError::NotReady)
    }

    /// Reloads the document and upserts its policies and credentials.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::NotReady`] before `init`, or any load error. A
    /// failed refresh leaves the in-memory state as it was.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let manager = self.inner.manager.as_ref().ok_or(IamError::NotReady)?;
        let components = self.components().ok_or(IamError::NotReady)?;
        let document = manager.load().await?;
        self.apply(&components, document).await;
        Ok(())
    }

    async fn apply(&self, components: &Components, document: IamDocument) {
        for (account, policy) in &document.policy.minio.users {
            components.policy.set_policy(account.clone(), policy.clone());
        }

        for (access_key, credential) in &document.identity.minio.users {
            if *access_key != credential.access_key {
                tracing::warn!(
                    %access_key,
                    record = %credential.access_key,
                    "skipping credential stored under a different access key"
                );
                continue;
            }
            if let Err(err) = components.credentials.set(credential.clone()).await {
                tracing::warn!(%access_key, error = %err, "skipping credential");
            }
        }

        self.rebuild_validator(&document).await;
        *self.inner.document.write() = Some(Arc::new(document));
        self.inner.refresh_count.fetch_add(1, Ordering::Relaxed);
    }

    async fn rebuild_validator(&self, document: &IamDocument) {
        if document.identity.kind != IdentityType::OpenId {
            return;
        }
        let Some(url) = document.jwks_url() else { return };
        let unchanged = self.inner.validator.read().as_ref().is_some_and(|v| v.url == url);
        if unchanged {
            return;
        }

        match TokenValidator::from_url(url).await {
            Ok(validator) => {
                tracing::info!(url, "signing key set changed, validator rebuilt");
                *self.inner.validator.write() =
                    Some(ResolvedValidator { url: url.to_owned(), validator: Arc::new(validator) });
            },
            Err(err) => {
                tracing::warn!(url, error = %err, "keeping previous validator");
            },
        }
    }

    /// Decides an authorization request.
    ///
    /// An unconfigured subsystem allows everything. A configured subsystem
    /// that is not [`IamState::Ready`] denies. Otherwise the decision comes
    /// from the [`PolicyEngine`]; failures deny.
    pub async fn is_allowed(&self, args: &Args) -> bool {
        if !self.is_configured() {
            return true;
        }
        match self.ready_components() {
            Ok(components) => components.policy.is_allowed(args).await,
            Err(_) => {
                tracing::warn!(account = %args.account, "IAM subsystem not ready, denying");
                false
            },
        }
    }

    /// Stores `credential` under `access_key`.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::InvalidCredential`] if `access_key` differs from
    /// the credential's own access key, or any [`CredentialStore::set`] error.
    #[tracing::instrument(skip(self, credential))]
    pub async fn set_user(&self, access_key: &str, credential: Credential) -> Result<()> {
        let components = self.ready_components()?;
        if access_key != credential.access_key {
            return Err(IamError::invalid_credential(format!(
                "credential for {:?} cannot be stored under {access_key:?}",
                credential.access_key
            )));
        }
        components.credentials.set(credential).await
    }

    /// Returns the valid credential for `access_key`.
    #[must_use]
    pub fn get_user(&self, access_key: &str) -> Option<Credential> {
        self.ready_components().ok()?.credentials.get(access_key)
    }

    /// Removes the credential for `access_key`.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::NotReady`] before `init`, or a transport error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, access_key: &str) -> Result<()> {
        self.ready_components()?.credentials.delete(access_key).await
    }

    /// Stores `policy` for `account`; an empty policy removes it.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::NotReady`] before `init`.
    pub fn set_policy(&self, account: &str, policy: Policy) -> Result<()> {
        self.ready_components()?.policy.set_policy(account, policy);
        Ok(())
    }

    /// Removes the policy for `account`.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::NotReady`] before `init`.
    pub fn remove_policy(&self, account: &str) -> Result<()> {
        self.ready_components()?.policy.remove_policy(account);
        Ok(())
    }

    /// Returns the policy stored for `account`.
    #[must_use]
    pub fn get_policy(&self, account: &str) -> Option<Policy> {
        self.ready_components().ok()?.policy.get_policy(account)
    }

    /// The validator for the configured key set, if identity is `openid`.
    #[must_use]
    pub fn token_validator(&self) -> Option<Arc<TokenValidator>> {
        self.inner.validator.read().as_ref().map(|v| Arc::clone(&v.validator))
    }

    /// Exchanges a bearer token for a temporary credential.
    ///
    /// The credential expires when the negotiated session does, which is
    /// never later than the token itself.
    ///
    /// # Errors
    ///
    /// - [`IamError::ConfigInvalid`] unless identity is `openid`
    /// - [`IamError::Token`] if the token is rejected or `duration_secs` is
    ///   out of range
    /// - any [`CredentialStore::set`] error
    #[tracing::instrument(skip(self, token))]
    pub async fn assume_role_with_token(
        &self,
        token: &str,
        duration_secs: Option<u64>,
    ) -> Result<Credential> {
        let components = self.ready_components()?;
        if components.identity != IdentityType::OpenId {
            return Err(IamError::config_invalid(format!(
                "token exchange requires openid identity, configured identity is {}",
                components.identity
            )));
        }
        let validator = self.token_validator().ok_or(IamError::NotReady)?;

        let claims = validator.validate(token, duration_secs)?;
        let expires_at = claims.expires_at();
        let expiration = DateTime::from_timestamp(expires_at, 0).ok_or_else(|| {
            IamError::invalid_credential(format!("session expiry {expires_at} out of range"))
        })?;

        let credential = Credential::temporary(expiration);
        components.credentials.set(credential.clone()).await?;
        tracing::info!(
            access_key = %credential.access_key,
            subject = claims.get_str("sub").unwrap_or_default(),
            duration_secs = claims.duration_secs(),
            "issued temporary credential"
        );
        Ok(credential)
    }

    /// Returns the stored document bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::NotReady`] on an unconfigured subsystem, or any
    /// [`IamConfigManager::load_raw`] error.
    pub async fn config(&self) -> Result<Bytes> {
        let manager = self.inner.manager.as_ref().ok_or(IamError::NotReady)?;
        manager.load_raw().await
    }

    /// Replaces the stored document and, once ready, applies it.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::NotReady`] on an unconfigured subsystem, or any
    /// [`IamConfigManager::save_raw`] error. Nothing is written if the
    /// document is rejected.
    #[tracing::instrument(skip(self, data), fields(len = data.len()))]
    pub async fn set_config(&self, data: Vec<u8>) -> Result<()> {
        let manager = self.inner.manager.as_ref().ok_or(IamError::NotReady)?;
        let document = manager.save_raw(data).await?;
        if let Ok(components) = self.ready_components() {
            self.apply(&components, document).await;
        }
        Ok(())
    }

    /// Stops the background tasks and waits for them to exit.
    ///
    /// Requests arriving afterwards are denied.
    pub async fn shutdown(&self) {
        *self.inner.state.write() = IamState::ShuttingDown;
        self.inner.cancel.cancel();

        let Tasks { ticker, watch } = std::mem::take(&mut *self.inner.tasks.lock());
        if let Some(ticker) = ticker {
            if let Err(err) = ticker.await {
                tracing::warn!(error = %err, "refresh ticker ended abnormally");
            }
        }
        if let Some(watch) = watch {
            watch.shutdown().await;
        }
        if let Some(components) = self.components() {
            components.credentials.shutdown().await;
        }
        tracing::info!("IAM subsystem shut down");
    }
}

struct DocumentListener {
    inner: Weak<Inner>,
}

#[async_trait]
impl ChangeListener for DocumentListener {
    async fn on_change(&self, path: &str) {
        let Some(inner) = self.inner.upgrade() else { return };
        let sys = IamSys { inner };
        if sys.state() != IamState::Ready {
            return;
        }
        match sys.refresh().await {
            Ok(()) => tracing::debug!(path, "IAM configuration reloaded after change"),
            Err(err) => tracing::warn!(path, error = %err, "IAM configuration reload failed"),
        }
    }
}
