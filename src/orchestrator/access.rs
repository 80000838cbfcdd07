use std::net::IpAddr;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Domain, InstanceKind};
use crate::proxy::AliasOp;
use crate::registry::domains::AddDomainParams;
use crate::registry::{applications, deployments, domains, network};

use super::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    Add,
    Remove,
}

impl Orchestrator {
    // -----------------------------------------------------------------------
    // Custom domains
    // -----------------------------------------------------------------------

    /// Register a custom FQDN and alias it onto the owning deployment's proxy
    /// route. Fails with a conflict if the name is registered anywhere on the
    /// host, leaving the route table untouched.
    #[tracing::instrument(skip(self, params), fields(%application_id, name = %params.name), err)]
    pub async fn add_domain(
        &self,
        application_id: Uuid,
        params: AddDomainParams,
    ) -> Result<Domain> {
        validate_fqdn(&params.name)?;

        let pool = &self.services.pool;
        let app = applications::get(pool, application_id).await?;
        let domain = domains::create(pool, application_id, &params).await?;

        let deployment = deployments::find_active_one(
            pool,
            application_id,
            params.instance_type,
            &params.environment,
        )
        .await?;

        self.services
            .proxy
            .apply_alias(&deployment.access_host(&app), &domain.name, AliasOp::Add)
            .await
            .map_err(|e| Error::dependency("reverse proxy", "add domain alias", e))?;

        Ok(domain)
    }

    /// Unregister a custom FQDN and drop it from the owning route, pruning
    /// the route entirely if no hosts remain.
    #[tracing::instrument(skip(self), fields(%application_id, %name), err)]
    pub async fn remove_domain(&self, application_id: Uuid, name: &str) -> Result<()> {
        let pool = &self.services.pool;
        let app = applications::get(pool, application_id).await?;

        let domain = domains::find_by_name(pool, name)
            .await?
            .ok_or_else(|| Error::not_found(format!("domain {name}")))?;
        if domain.application_id != application_id {
            return Err(Error::validation(
                "domain is not registered to this application",
            ));
        }

        domains::delete(pool, domain.id).await?;

        let deployment = deployments::find_active_one(
            pool,
            application_id,
            domain.instance_type,
            &domain.environment,
        )
        .await?;

        self.services
            .proxy
            .apply_alias(&deployment.access_host(&app), &domain.name, AliasOp::Remove)
            .await
            .map_err(|e| Error::dependency("reverse proxy", "remove domain alias", e))?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Database network access
    // -----------------------------------------------------------------------

    /// Whitelist or revoke a client IP for every active database deployment
    /// port in the environment, keeping an audit row per grant.
    #[tracing::instrument(skip(self), fields(%application_id, %environment, %ip, ?op), err)]
    pub async fn manage_database_network_access(
        &self,
        application_id: Uuid,
        environment: &str,
        ip: &str,
        op: AccessOp,
    ) -> Result<()> {
        let parsed: IpAddr = ip
            .parse()
            .map_err(|_| Error::validation(format!("invalid IP: {ip}")))?;

        let pool = &self.services.pool;
        let existing = network::find(pool, application_id, ip, environment).await?;

        let db_deployments = deployments::find_active(
            pool,
            application_id,
            InstanceKind::Database,
            environment,
        )
        .await?;

        match op {
            AccessOp::Add => {
                if existing.is_some() {
                    return Err(Error::conflict(format!(
                        "IP {ip} is already whitelisted for environment {environment}"
                    )));
                }
                if db_deployments.is_empty() {
                    return Err(Error::not_found(format!(
                        "active database deployment in environment {environment}"
                    )));
                }

                for deployment in &db_deployments {
                    if let Some(port) = deployment.port.and_then(|p| u16::try_from(p).ok()) {
                        self.firewall
                            .whitelist_ip(parsed, port)
                            .await
                            .map_err(|e| Error::dependency("firewall", "whitelist ip", e))?;
                    }
                }

                network::create(pool, application_id, ip, environment).await?;
                Ok(())
            }
            AccessOp::Remove => {
                let Some(record) = existing else {
                    return Err(Error::conflict(format!(
                        "IP {ip} is not whitelisted for environment {environment}"
                    )));
                };

                for deployment in &db_deployments {
                    if let Some(port) = deployment.port.and_then(|p| u16::try_from(p).ok()) {
                        self.firewall
                            .blacklist_ip(parsed, port)
                            .await
                            .map_err(|e| Error::dependency("firewall", "blacklist ip", e))?;
                    }
                }

                network::delete(pool, record.id).await
            }
        }
    }
}

/// Basic FQDN shape check; full DNS validation belongs to the proxy's ACME
/// flow, not here.
fn validate_fqdn(name: &str) -> Result<()> {
    if name.len() < 3 || name.len() > 253 || !name.contains('.') {
        return Err(Error::validation(format!("invalid domain name: {name}")));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::validation(format!(
            "domain name contains invalid characters: {name}"
        )));
    }
    if name.starts_with(['-', '.']) || name.ends_with(['-', '.']) {
        return Err(Error::validation(format!("invalid domain name: {name}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_fqdn() {
        assert!(validate_fqdn("api.example.com").is_ok());
        assert!(validate_fqdn("dev-api.use-moyo.app").is_ok());
    }

    #[test]
    fn rejects_bare_hostname() {
        assert!(validate_fqdn("localhost").is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(validate_fqdn("api.example.com/path").is_err());
        assert!(validate_fqdn("api example.com").is_err());
    }

    #[test]
    fn rejects_edge_punctuation() {
        assert!(validate_fqdn(".example.com").is_err());
        assert!(validate_fqdn("example.com-").is_err());
    }
}
