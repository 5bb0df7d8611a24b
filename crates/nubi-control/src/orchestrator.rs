//! The reload barrier
//!
//! The one place where mutation is linearized against the nginx child.
//! Every operation that must affect nginx follows the same sequence: stage
//! in the store, materialize fragments, `nginx -t`, then commit and reload.
//! A failed `-t` restores every touched fragment bit-identically and leaves
//! the store untouched; a failed reload downgrades to a warning because the
//! filesystem and store already reflect the desired state and reload can be
//! retried.
//!
//! The mutex is held across all I/O in a mutation, ACME issuance included,
//! so concurrent mutations queue rather than interleave.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use nubi_acme::dns::ProviderConfig;
use nubi_acme::{material, AcmeAgent};
use nubi_model::{
    Certificate, CertProvenance, CertificateSpec, DefaultRoute, DefaultRouteMode, Error, HostSpec,
    MaintenanceBackup, MaintenancePayload, ProxyHost, Result,
};
use nubi_nginx::render::maintenance_page;
use nubi_nginx::{
    fragment_name, FragmentState, Reconciler, Renderer, Supervisor, SupervisorStatus,
    DEFAULT_ROUTE_FRAGMENT,
};
use nubi_store::{ImportReport, StateStore};

use crate::telemetry::Telemetry;

/// A successful mutation, possibly carrying a non-fatal warning
/// (reload failed, validation unavailable).
#[derive(Debug, Clone)]
pub struct MutationOutcome<T> {
    pub value: T,
    pub warning: Option<String>,
}

impl<T> MutationOutcome<T> {
    fn new(value: T, warning: Option<String>) -> Self {
        Self { value, warning }
    }
}

/// Serializes every nginx-affecting mutation
pub struct Orchestrator {
    gate: Mutex<()>,
    store: Arc<StateStore>,
    renderer: Renderer,
    reconciler: Reconciler,
    supervisor: Arc<Supervisor>,
    acme: Arc<AcmeAgent>,
    telemetry: Arc<Telemetry>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<StateStore>,
        renderer: Renderer,
        reconciler: Reconciler,
        supervisor: Arc<Supervisor>,
        acme: Arc<AcmeAgent>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            gate: Mutex::new(()),
            store,
            renderer,
            reconciler,
            supervisor,
            acme,
            telemetry,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    // ------------------------------------------------------------------
    // Barrier plumbing
    // ------------------------------------------------------------------

    fn render_host(&self, host: &ProxyHost) -> String {
        let certificate = host
            .certificate_id
            .as_deref()
            .and_then(|id| self.store.get_certificate(id).ok());
        self.renderer.render_host(host, certificate.as_ref())
    }

    /// Write the fragments a host change touches, stashing prior state.
    /// A domain rename withdraws the old fragment first.
    async fn stage_host(
        &self,
        host: &ProxyHost,
        replaced_domain: Option<&str>,
    ) -> Result<Vec<FragmentState>> {
        let mut stash = Vec::new();

        if let Some(old_domain) = replaced_domain {
            if old_domain != host.domain {
                let old_name = fragment_name(old_domain);
                stash.push(self.reconciler.snapshot(&old_name).await?);
                self.reconciler.withdraw(&old_name).await?;
            }
        }

        let name = fragment_name(&host.domain);
        stash.push(self.reconciler.snapshot(&name).await?);
        let rendered = self.render_host(host);
        self.reconciler
            .materialize(&name, &rendered, host.enabled)
            .await?;

        Ok(stash)
    }

    /// Run `nginx -t`. On rejection, restore every stashed fragment and
    /// return `ConfigInvalid`. When nginx cannot be invoked at all the
    /// change stands and the caller gets a warning: the filesystem is the
    /// desired state, and there is nothing to validate against.
    async fn validate_or_rollback(&self, stash: &[FragmentState]) -> Result<Option<String>> {
        match self.supervisor.validate().await {
            Ok(out) if out.success => Ok(None),
            Ok(out) => {
                for state in stash.iter().rev() {
                    if let Err(e) = self.reconciler.restore(state).await {
                        warn!(fragment = %state.name, error = %e, "rollback restore failed");
                    }
                }
                Err(Error::ConfigInvalid { output: out.output })
            }
            Err(e) => Ok(Some(format!("nginx validation unavailable: {e}"))),
        }
    }

    async fn reload_warning(&self) -> Option<String> {
        match self.supervisor.reload().await {
            Ok(out) if out.success => None,
            Ok(out) => Some(format!("nginx reload failed: {}", out.output)),
            Err(e) => Some(format!("nginx reload failed: {e}")),
        }
    }

    async fn emit_status(&self) {
        let event = self.telemetry.nginx_status_event().await;
        self.telemetry.fanout().broadcast(event);
    }

    // ------------------------------------------------------------------
    // Proxy hosts
    // ------------------------------------------------------------------

    pub async fn create_host(&self, spec: HostSpec) -> Result<MutationOutcome<ProxyHost>> {
        let _guard = self.gate.lock().await;

        let host = self.store.prepare_create_host(spec)?;
        let stash = self.stage_host(&host, None).await?;
        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        self.store.commit_host(host.clone())?;
        self.emit_status().await;
        Ok(MutationOutcome::new(host, warning))
    }

    pub async fn update_host(
        &self,
        id: &str,
        spec: HostSpec,
    ) -> Result<MutationOutcome<ProxyHost>> {
        let _guard = self.gate.lock().await;

        let (updated, previous) = self.store.prepare_update_host(id, spec)?;
        let stash = self.stage_host(&updated, Some(&previous.domain)).await?;
        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        self.store.commit_host(updated.clone())?;
        self.emit_status().await;
        Ok(MutationOutcome::new(updated, warning))
    }

    pub async fn delete_host(&self, id: &str) -> Result<MutationOutcome<ProxyHost>> {
        let _guard = self.gate.lock().await;

        let host = self.store.get_host(id)?;
        let name = fragment_name(&host.domain);
        let stash = vec![self.reconciler.snapshot(&name).await?];
        self.reconciler.withdraw(&name).await?;

        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        let removed = self.store.remove_host(id)?;
        self.emit_status().await;
        Ok(MutationOutcome::new(removed, warning))
    }

    pub async fn toggle_host(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<MutationOutcome<ProxyHost>> {
        let _guard = self.gate.lock().await;

        let host = self.store.prepare_toggle_host(id, enabled)?;
        let stash = self.stage_host(&host, None).await?;
        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        self.store.commit_host(host.clone())?;
        self.emit_status().await;
        Ok(MutationOutcome::new(host, warning))
    }

    pub async fn set_host_maintenance(
        &self,
        id: &str,
        maintenance: bool,
    ) -> Result<MutationOutcome<ProxyHost>> {
        let _guard = self.gate.lock().await;

        let host = self.store.prepare_host_maintenance(id, maintenance)?;
        let stash = self.stage_host(&host, None).await?;
        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        self.store.commit_host(host.clone())?;
        self.emit_status().await;
        Ok(MutationOutcome::new(host, warning))
    }

    /// Bind a certificate to a set of hosts, regenerating each fragment.
    pub async fn apply_certificate(
        &self,
        cert_id: &str,
        host_ids: &[String],
    ) -> Result<MutationOutcome<Vec<ProxyHost>>> {
        let _guard = self.gate.lock().await;

        let staged: Vec<ProxyHost> = host_ids
            .iter()
            .map(|id| self.store.prepare_apply_certificate(id, cert_id))
            .collect::<Result<_>>()?;

        let mut stash = Vec::new();
        for host in &staged {
            stash.extend(self.stage_host(host, None).await?);
        }

        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        for host in &staged {
            self.store.commit_host(host.clone())?;
        }
        self.emit_status().await;
        Ok(MutationOutcome::new(staged, warning))
    }

    /// Import hosts. Same-domain records are skipped unless `overwrite`,
    /// in which case they update the existing id. Per-item failures become
    /// error strings; the batch never aborts.
    pub async fn import_hosts(
        &self,
        specs: Vec<HostSpec>,
        overwrite: bool,
    ) -> Result<MutationOutcome<ImportReport>> {
        let _guard = self.gate.lock().await;

        let mut report = ImportReport::default();

        for spec in specs {
            let domain = spec.domain.clone();
            match self.import_one(spec, overwrite).await {
                Ok(true) => report.imported += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => report.errors.push(format!("{domain}: {e}")),
            }
        }

        let warning = if report.imported > 0 {
            let warning = self.reload_warning().await;
            self.emit_status().await;
            warning
        } else {
            None
        };

        info!(
            imported = report.imported,
            skipped = report.skipped,
            errors = report.errors.len(),
            "host import finished"
        );
        Ok(MutationOutcome::new(report, warning))
    }

    async fn import_one(&self, spec: HostSpec, overwrite: bool) -> Result<bool> {
        match self.store.find_host_by_domain(&spec.domain) {
            Some(existing) => {
                if !overwrite {
                    return Ok(false);
                }
                let (updated, previous) = self.store.prepare_update_host(&existing.id, spec)?;
                let stash = self.stage_host(&updated, Some(&previous.domain)).await?;
                self.validate_or_rollback(&stash).await?;
                self.store.commit_host(updated)?;
                Ok(true)
            }
            None => {
                let host = self.store.prepare_create_host(spec)?;
                let stash = self.stage_host(&host, None).await?;
                self.validate_or_rollback(&stash).await?;
                self.store.commit_host(host)?;
                Ok(true)
            }
        }
    }

    // ------------------------------------------------------------------
    // Default route and maintenance
    // ------------------------------------------------------------------

    async fn write_route_bodies(&self, route: &DefaultRoute) -> Result<()> {
        if route.mode == DefaultRouteMode::CustomPage && !route.custom_html.is_empty() {
            self.reconciler
                .write_html("nubi_default.html", &route.custom_html)
                .await?;
        }
        for page in &route.error_pages {
            if !page.custom_html.is_empty() {
                self.reconciler
                    .write_html(&format!("nubi_error_{}.html", page.code), &page.custom_html)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn set_default_route(
        &self,
        mut route: DefaultRoute,
    ) -> Result<MutationOutcome<DefaultRoute>> {
        let _guard = self.gate.lock().await;

        if !route.enabled {
            let warning = self.disable_route_locked().await?;
            let current = self.store.default_route();
            return Ok(MutationOutcome::new(current, warning));
        }

        route.enabled = true;
        self.write_route_bodies(&route).await?;

        let stash = vec![self.reconciler.snapshot(DEFAULT_ROUTE_FRAGMENT).await?];
        let rendered = self.renderer.render_default_route(&route);
        self.reconciler
            .materialize(DEFAULT_ROUTE_FRAGMENT, &rendered, true)
            .await?;

        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        self.store.commit_default_route(route.clone())?;
        self.emit_status().await;
        Ok(MutationOutcome::new(route, warning))
    }

    pub async fn disable_default_route(&self) -> Result<MutationOutcome<DefaultRoute>> {
        let _guard = self.gate.lock().await;
        let warning = self.disable_route_locked().await?;
        self.emit_status().await;
        Ok(MutationOutcome::new(self.store.default_route(), warning))
    }

    async fn disable_route_locked(&self) -> Result<Option<String>> {
        let stash = vec![self.reconciler.snapshot(DEFAULT_ROUTE_FRAGMENT).await?];
        self.reconciler.withdraw(DEFAULT_ROUTE_FRAGMENT).await?;

        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        let mut route = self.store.default_route();
        route.enabled = false;
        self.store.commit_default_route(route)?;
        Ok(warning)
    }

    /// Enable or disable global maintenance mode. Enabling shadows the
    /// default route after saving it to the backup slot; disabling restores
    /// the saved route byte-identically.
    pub async fn set_maintenance(
        &self,
        enabled: bool,
        message: String,
    ) -> Result<MutationOutcome<MaintenancePayload>> {
        let _guard = self.gate.lock().await;

        let outcome = if enabled {
            self.enable_maintenance_locked(message).await?
        } else {
            self.disable_maintenance_locked().await?
        };

        let event = self.telemetry.maintenance_event();
        self.telemetry.fanout().broadcast(event);
        Ok(outcome)
    }

    async fn enable_maintenance_locked(
        &self,
        message: String,
    ) -> Result<MutationOutcome<MaintenancePayload>> {
        let current = self.store.default_route();
        let backup = MaintenanceBackup {
            message: message.clone(),
            previous: current.enabled.then_some(current),
        };

        let page = maintenance_page(&message);
        self.reconciler.write_html("nubi_default.html", &page).await?;

        let route = DefaultRoute {
            enabled: true,
            mode: DefaultRouteMode::CustomPage,
            custom_html: page,
            ..Default::default()
        };

        let stash = vec![self.reconciler.snapshot(DEFAULT_ROUTE_FRAGMENT).await?];
        let rendered = self.renderer.render_default_route(&route);
        self.reconciler
            .materialize(DEFAULT_ROUTE_FRAGMENT, &rendered, true)
            .await?;

        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        self.store.set_maintenance_backup(Some(backup))?;
        self.store.commit_default_route(route)?;
        info!("maintenance mode enabled");

        Ok(MutationOutcome::new(
            MaintenancePayload {
                enabled: true,
                message: (!message.is_empty()).then_some(message),
            },
            warning,
        ))
    }

    async fn disable_maintenance_locked(&self) -> Result<MutationOutcome<MaintenancePayload>> {
        let Some(backup) = self.store.maintenance_backup() else {
            return Ok(MutationOutcome::new(
                MaintenancePayload {
                    enabled: false,
                    message: None,
                },
                None,
            ));
        };

        let stash = vec![self.reconciler.snapshot(DEFAULT_ROUTE_FRAGMENT).await?];
        let restored = match &backup.previous {
            Some(route) => {
                self.write_route_bodies(route).await?;
                let rendered = self.renderer.render_default_route(route);
                self.reconciler
                    .materialize(DEFAULT_ROUTE_FRAGMENT, &rendered, true)
                    .await?;
                route.clone()
            }
            None => {
                self.reconciler.withdraw(DEFAULT_ROUTE_FRAGMENT).await?;
                DefaultRoute::default()
            }
        };

        let warning = self.validate_or_rollback(&stash).await?;
        let warning = match warning {
            Some(w) => Some(w),
            None => self.reload_warning().await,
        };

        self.store.set_maintenance_backup(None)?;
        self.store.commit_default_route(restored)?;
        info!("maintenance mode disabled, previous route restored");

        Ok(MutationOutcome::new(
            MaintenancePayload {
                enabled: false,
                message: None,
            },
            warning,
        ))
    }

    pub fn maintenance_state(&self) -> MaintenancePayload {
        let backup = self.store.maintenance_backup();
        MaintenancePayload {
            enabled: backup.is_some(),
            message: backup.map(|b| b.message).filter(|m| !m.is_empty()),
        }
    }

    // ------------------------------------------------------------------
    // Certificates
    // ------------------------------------------------------------------

    /// Issue a certificate for one or more domains through DNS-01 and store
    /// it. Holds the mutation gate for the whole issuance.
    pub async fn issue_certificate(
        &self,
        name: Option<String>,
        domains: Vec<String>,
        provider: ProviderConfig,
        auto_renew: bool,
    ) -> Result<Certificate> {
        let _guard = self.gate.lock().await;

        if domains.is_empty() {
            return Err(Error::validation("at least one domain is required"));
        }

        let cert_id = Uuid::new_v4().to_string();
        let issued = self.acme.issue(&cert_id, &domains, &provider).await?;

        let now = Utc::now();
        let cert = Certificate {
            id: cert_id,
            name: name.unwrap_or_else(|| domains[0].clone()),
            domains,
            cert_path: issued.cert_path,
            key_path: issued.key_path,
            chain_path: None,
            provenance: CertProvenance::AcmeIssued,
            expires_at: issued.expires_at,
            auto_renew,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_certificate(cert.clone())?;
        Ok(cert)
    }

    /// Renew an ACME certificate in place: fresh bundle, same id, then
    /// regenerate and reload every bound host so nginx picks up the new
    /// material.
    pub async fn renew_certificate(
        &self,
        cert_id: &str,
        provider: ProviderConfig,
    ) -> Result<MutationOutcome<Certificate>> {
        let _guard = self.gate.lock().await;

        let cert = self.store.get_certificate(cert_id)?;
        if cert.provenance != CertProvenance::AcmeIssued {
            return Err(Error::validation(
                "only ACME-issued certificates can be renewed",
            ));
        }

        let issued = self.acme.issue(cert_id, &cert.domains, &provider).await?;
        let updated = self.store.update_certificate_material(
            cert_id,
            issued.cert_path,
            issued.key_path,
            None,
            issued.expires_at,
        )?;

        // Rebuild bound host fragments and reload so the new material is
        // actually served.
        let bound = self.store.hosts_bound_to_certificate(cert_id);
        let mut stash = Vec::new();
        for host_id in &bound {
            let host = self.store.get_host(host_id)?;
            stash.extend(self.stage_host(&host, None).await?);
        }

        let warning = if bound.is_empty() {
            None
        } else {
            let warning = self.validate_or_rollback(&stash).await?;
            match warning {
                Some(w) => Some(w),
                None => self.reload_warning().await,
            }
        };

        self.emit_status().await;
        Ok(MutationOutcome::new(updated, warning))
    }

    /// Store operator-supplied PEM material as a certificate, parsing the
    /// covered domains and expiry out of the leaf.
    pub async fn upload_certificate(
        &self,
        name: String,
        cert_pem: String,
        key_pem: String,
        auto_renew: bool,
    ) -> Result<Certificate> {
        let _guard = self.gate.lock().await;

        if name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        if !cert_pem.contains("BEGIN CERTIFICATE") {
            return Err(Error::validation("certificate is not PEM-encoded"));
        }

        let cert_id = Uuid::new_v4().to_string();
        let certs_dir = self.store.data_dir().join("certs");
        let (cert_path, key_path) =
            material::write_material(&certs_dir, &cert_id, &cert_pem, &key_pem)
                .await
                .map_err(nubi_model::Error::from)?;

        let domains = material::parse_domains(cert_pem.as_bytes());
        let expires_at =
            material::parse_not_after(cert_pem.as_bytes()).unwrap_or_else(Utc::now);

        let now = Utc::now();
        let cert = Certificate {
            id: cert_id,
            name,
            domains,
            cert_path,
            key_path,
            chain_path: None,
            provenance: CertProvenance::Uploaded,
            expires_at,
            auto_renew,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_certificate(cert.clone())?;
        Ok(cert)
    }

    /// Generate and store a self-signed certificate for development.
    pub async fn create_self_signed_certificate(
        &self,
        name: Option<String>,
        domains: Vec<String>,
    ) -> Result<Certificate> {
        let _guard = self.gate.lock().await;

        let generated =
            material::generate_self_signed(&domains).map_err(nubi_model::Error::from)?;

        let cert_id = Uuid::new_v4().to_string();
        let certs_dir = self.store.data_dir().join("certs");
        let (cert_path, key_path) = material::write_material(
            &certs_dir,
            &cert_id,
            &generated.cert_pem,
            &generated.key_pem,
        )
        .await
        .map_err(nubi_model::Error::from)?;

        let now = Utc::now();
        let cert = Certificate {
            id: cert_id,
            name: name.unwrap_or_else(|| domains[0].clone()),
            domains,
            cert_path,
            key_path,
            chain_path: None,
            provenance: CertProvenance::SelfSigned,
            expires_at: generated.expires_at,
            auto_renew: false,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_certificate(cert.clone())?;
        Ok(cert)
    }

    pub async fn update_certificate(
        &self,
        id: &str,
        spec: CertificateSpec,
    ) -> Result<Certificate> {
        let _guard = self.gate.lock().await;
        self.store.update_certificate_meta(id, spec)
    }

    /// Delete a certificate and its on-disk material. Refused while bound.
    pub async fn delete_certificate(&self, id: &str) -> Result<Certificate> {
        let _guard = self.gate.lock().await;

        let removed = self.store.delete_certificate(id)?;
        for path in [
            Some(&removed.cert_path),
            Some(&removed.key_path),
            removed.chain_path.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path, error = %e, "failed to remove certificate material");
                }
            }
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Tags
    //
    // No fragment is affected, but state-file writes stay serialized
    // under the same gate as every other mutation.
    // ------------------------------------------------------------------

    pub async fn create_tag(&self, spec: nubi_model::TagSpec) -> Result<nubi_model::Tag> {
        let _guard = self.gate.lock().await;
        self.store.create_tag(spec)
    }

    pub async fn update_tag(
        &self,
        id: &str,
        spec: nubi_model::TagSpec,
    ) -> Result<nubi_model::Tag> {
        let _guard = self.gate.lock().await;
        self.store.update_tag(id, spec)
    }

    pub async fn delete_tag(&self, id: &str) -> Result<()> {
        let _guard = self.gate.lock().await;
        self.store.delete_tag(id)
    }

    pub async fn bulk_apply_tag(
        &self,
        tag_id: &str,
        action: nubi_store::BulkTagAction,
        host_ids: &[String],
        certificate_ids: &[String],
    ) -> Result<nubi_store::BulkTagResult> {
        let _guard = self.gate.lock().await;
        self.store
            .bulk_apply_tag(tag_id, action, host_ids, certificate_ids)
    }

    // ------------------------------------------------------------------
    // nginx passthrough and subscriber commands
    // ------------------------------------------------------------------

    pub async fn nginx_status(&self) -> SupervisorStatus {
        self.supervisor.status().await
    }

    pub async fn test_config(&self) -> Result<nubi_nginx::CommandOutput> {
        self.supervisor.validate().await
    }

    /// Operator-requested reload, outside any staged change.
    pub async fn reload_nginx(&self) -> Result<String> {
        let _guard = self.gate.lock().await;
        let result = self.supervisor.reload().await;
        self.emit_status().await;
        match result {
            Ok(out) if out.success => Ok(out.output),
            Ok(out) => Err(Error::ReloadFailed { output: out.output }),
            Err(e) => Err(Error::ReloadFailed {
                output: e.to_string(),
            }),
        }
    }

    /// Route a subscriber command back through the control plane.
    pub async fn handle_subscriber_command(&self, sink: crate::fanout::SinkId, action: &str) {
        match action {
            "reload" => {
                let _ = self.reload_nginx().await;
            }
            "test" => self.emit_status().await,
            "get_status" => {
                let events = self.telemetry.snapshot_events().await;
                self.telemetry.fanout().send_to(sink, events);
            }
            other => {
                warn!(action = %other, "unknown subscriber command");
            }
        }
    }

    // ------------------------------------------------------------------
    // Startup reconciliation
    // ------------------------------------------------------------------

    /// Bring the filesystem in line with persisted state after a restart:
    /// re-materialize every host fragment and the default route, creating
    /// a stock default route when none is configured. Validation failures
    /// here warn instead of rolling back; persisted state is the desired
    /// state.
    pub async fn reconcile_startup(&self) -> Result<Option<String>> {
        let _guard = self.gate.lock().await;

        for host in self.store.list_hosts() {
            let name = fragment_name(&host.domain);
            let rendered = self.render_host(&host);
            self.reconciler
                .materialize(&name, &rendered, host.enabled)
                .await?;
        }

        let route = self.store.default_route();
        if route.enabled {
            self.write_route_bodies(&route).await?;
            let rendered = self.renderer.render_default_route(&route);
            self.reconciler
                .materialize(DEFAULT_ROUTE_FRAGMENT, &rendered, true)
                .await?;
        } else {
            info!("no default route configured, creating stock default");
            let stock = DefaultRoute {
                enabled: true,
                mode: DefaultRouteMode::NginxDefault,
                ..Default::default()
            };
            let rendered = self.renderer.render_default_route(&stock);
            self.reconciler
                .materialize(DEFAULT_ROUTE_FRAGMENT, &rendered, true)
                .await?;
            self.store.commit_default_route(stock)?;
        }

        let warning = match self.supervisor.validate().await {
            Ok(out) if out.success => self.reload_warning().await,
            Ok(out) => Some(format!("nginx rejected persisted configuration: {}", out.output)),
            Err(e) => Some(format!("nginx validation unavailable: {e}")),
        };

        if let Some(w) = &warning {
            warn!(warning = %w, "startup reconciliation finished with warning");
        } else {
            info!("startup reconciliation finished");
        }
        Ok(warning)
    }
}
