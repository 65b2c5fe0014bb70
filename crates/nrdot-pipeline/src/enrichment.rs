// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `nrenrich`: metadata enrichment over resource attributes (preferred) or
//! item attributes when resource-scoping is unavailable.
//!
//! Per-item work (`process`) is a pure snapshot read — never blocking, per
//! §5's "pipeline processors MUST be non-blocking on any per-item path".
//! Everything that requires I/O (cloud-metadata probes) happens in
//! `refresh`, a background task that publishes a new `EnrichmentSnapshot`
//! behind an `ArcSwap`; `process` only ever reads the currently published
//! snapshot.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nrdot_types::batch::TelemetryItem;
use nrdot_types::{AttributeMap, AttributeValue, TelemetryBatch};

/// Default TTL metadata is cached for before a refresh is attempted again.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Canonical cloud-provider attribute keys, in the priority order the
/// provider itself is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    /// Amazon Web Services.
    Aws,
    /// Google Cloud Platform.
    Gcp,
    /// Microsoft Azure.
    Azure,
}

/// One fact about a cloud instance, as returned by a provider probe.
#[derive(Debug, Clone, Default)]
pub struct CloudFacts {
    /// `cloud.platform`, e.g. `"aws_ec2"`.
    pub platform: Option<String>,
    /// `cloud.region`.
    pub region: Option<String>,
    /// `cloud.instance.id`.
    pub instance_id: Option<String>,
    /// `cloud.availability_zone`.
    pub availability_zone: Option<String>,
    /// `cloud.instance.type`.
    pub instance_type: Option<String>,
}

/// A prioritized rule: if `predicate` matches an item's merged
/// (item + resource) attributes, `attributes` are added (never overwriting
/// an existing key). Rules are evaluated in descending `priority` order so
/// a higher-priority rule's additions are the ones a non-clobber write
/// actually keeps.
#[derive(Debug, Clone)]
pub struct ConditionalRule {
    /// Higher values are evaluated first.
    pub priority: i32,
    /// What must be true of the item for this rule to apply.
    pub predicate: Predicate,
    /// Attributes to add when the predicate matches.
    pub attributes: Vec<(String, String)>,
}

/// A predicate over an item's merged attribute set.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// The named attribute exists.
    KeyExists(String),
    /// The named attribute exists and stringifies to the given value.
    KeyEquals(String, String),
}

impl Predicate {
    fn matches(&self, merged: &AttributeMap) -> bool {
        match self {
            Self::KeyExists(key) => merged.contains_key(key),
            Self::KeyEquals(key, expected) => merged
                .get(key)
                .and_then(AttributeValue::as_str)
                .is_some_and(|actual| actual == expected),
        }
    }
}

/// Construction-time configuration.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentConfig {
    /// Static attributes from user configuration, always applied.
    pub static_attributes: Vec<(String, String)>,
    /// Conditional rules, applied in descending priority order.
    pub conditional_rules: Vec<ConditionalRule>,
    /// How long a refreshed snapshot remains valid before `refresh` should
    /// be called again.
    pub cache_ttl: Duration,
}

/// The cached result of the last successful (or attempted) refresh.
/// Everything in here is cheap to clone/read under a lock-free `ArcSwap`
/// load.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentSnapshot {
    /// Host facts: hostname, OS, architecture, CPU count. These rarely (if
    /// ever) change during a process lifetime, so they're collected once
    /// and carried forward by every subsequent refresh.
    pub host_attributes: BTreeMap<String, String>,
    /// Cloud-provider attributes, if a provider was detected.
    pub cloud_attributes: BTreeMap<String, String>,
    /// Container-orchestrator coordinates, if the ambient environment
    /// exposes them.
    pub k8s_attributes: BTreeMap<String, String>,
    /// When this snapshot was produced.
    pub refreshed_at: Option<Instant>,
}

fn cloud_attribute_map(provider: CloudProvider, facts: &CloudFacts) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let provider_name = match provider {
        CloudProvider::Aws => "aws",
        CloudProvider::Gcp => "gcp",
        CloudProvider::Azure => "azure",
    };
    out.insert("cloud.provider".to_string(), provider_name.to_string());
    if let Some(v) = &facts.platform {
        out.insert("cloud.platform".to_string(), v.clone());
    }
    if let Some(v) = &facts.region {
        out.insert("cloud.region".to_string(), v.clone());
    }
    if let Some(v) = &facts.instance_id {
        out.insert("cloud.instance.id".to_string(), v.clone());
    }
    if let Some(v) = &facts.availability_zone {
        out.insert("cloud.availability_zone".to_string(), v.clone());
    }
    if let Some(v) = &facts.instance_type {
        out.insert("cloud.instance.type".to_string(), v.clone());
    }
    out
}

/// Collects host facts via `sysinfo`: hostname, OS, architecture, and CPU
/// count.
#[must_use]
pub fn collect_host_attributes() -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(hostname) = sysinfo::System::host_name() {
        out.insert("host.name".to_string(), hostname);
    }
    if let Some(os) = sysinfo::System::name() {
        out.insert("os.type".to_string(), os);
    }
    out.insert("host.arch".to_string(), std::env::consts::ARCH.to_string());

    let mut system = sysinfo::System::new();
    system.refresh_cpu_all();
    out.insert("host.cpu.count".to_string(), system.cpus().len().to_string());
    out
}

/// Reads container-orchestrator coordinates from the ambient environment
/// (the common downward-API env var names); absent variables are simply
/// omitted rather than erroring.
#[must_use]
pub fn collect_k8s_attributes() -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (env_var, attr) in [
        ("POD_NAME", "k8s.pod.name"),
        ("POD_NAMESPACE", "k8s.namespace.name"),
        ("NODE_NAME", "k8s.node.name"),
        ("POD_IP", "k8s.pod.ip"),
    ] {
        if let Ok(value) = std::env::var(env_var) {
            if !value.is_empty() {
                out.insert(attr.to_string(), value);
            }
        }
    }
    out
}

/// Probes each cloud provider's instance-metadata endpoint in priority
/// order (AWS -> GCP -> Azure), returning the first successful hit. Each
/// probe uses a short per-call timeout; a non-present provider fails
/// silently (no error returned or logged above `debug`) since "not running
/// on any cloud" is the overwhelmingly common case, not a failure.
pub async fn probe_cloud_provider(client: &reqwest::Client, timeout: Duration) -> Option<(CloudProvider, CloudFacts)> {
    if let Some(facts) = probe_aws(client, timeout).await {
        return Some((CloudProvider::Aws, facts));
    }
    if let Some(facts) = probe_gcp(client, timeout).await {
        return Some((CloudProvider::Gcp, facts));
    }
    if let Some(facts) = probe_azure(client, timeout).await {
        return Some((CloudProvider::Azure, facts));
    }
    None
}

const AWS_METADATA_BASE: &str = "http://169.254.169.254/latest/meta-data";
const GCP_METADATA_BASE: &str = "http://metadata.google.internal/computeMetadata/v1/instance";
const AZURE_METADATA_URL: &str = "http://169.254.169.254/metadata/instance?api-version=2021-02-01";

async fn get_text(client: &reqwest::Client, url: &str, timeout: Duration, gcp_header: bool, azure_header: bool) -> Option<String> {
    let mut request = client.get(url).timeout(timeout);
    if gcp_header {
        request = request.header("Metadata-Flavor", "Google");
    }
    if azure_header {
        request = request.header("Metadata", "true");
    }
    let response = request.send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.text().await.ok()
}

async fn probe_aws(client: &reqwest::Client, timeout: Duration) -> Option<CloudFacts> {
    let instance_id = get_text(client, &format!("{AWS_METADATA_BASE}/instance-id"), timeout, false, false).await?;
    let instance_type = get_text(client, &format!("{AWS_METADATA_BASE}/instance-type"), timeout, false, false).await;
    let availability_zone = get_text(client, &format!("{AWS_METADATA_BASE}/placement/availability-zone"), timeout, false, false).await;
    let region = availability_zone.as_ref().map(|az| az.trim_end_matches(|c: char| c.is_ascii_alphabetic()).to_string());
    Some(CloudFacts {
        platform: Some("aws_ec2".to_string()),
        region,
        instance_id: Some(instance_id),
        availability_zone,
        instance_type,
    })
}

async fn probe_gcp(client: &reqwest::Client, timeout: Duration) -> Option<CloudFacts> {
    let instance_id = get_text(client, &format!("{GCP_METADATA_BASE}/id"), timeout, true, false).await?;
    let zone_path = get_text(client, &format!("{GCP_METADATA_BASE}/zone"), timeout, true, false).await;
    let instance_type = get_text(client, &format!("{GCP_METADATA_BASE}/machine-type"), timeout, true, false).await.map(|v| v.rsplit('/').next().unwrap_or_default().to_string());
    let availability_zone = zone_path.map(|v| v.rsplit('/').next().unwrap_or_default().to_string());
    let region = availability_zone.as_ref().and_then(|az| az.rsplitn(2, '-').nth(1)).map(str::to_string);
    Some(CloudFacts {
        platform: Some("gcp_compute_engine".to_string()),
        region,
        instance_id: Some(instance_id),
        availability_zone,
        instance_type,
    })
}

#[derive(Deserialize)]
struct AzureComputeDocument {
    #[serde(default)]
    location: Option<String>,
    #[serde(rename = "vmId", default)]
    vm_id: Option<String>,
    #[serde(rename = "vmSize", default)]
    vm_size: Option<String>,
    #[serde(default)]
    zone: Option<String>,
}

#[derive(Deserialize)]
struct AzureMetadataDocument {
    compute: AzureComputeDocument,
}

async fn probe_azure(client: &reqwest::Client, timeout: Duration) -> Option<CloudFacts> {
    let body = get_text(client, AZURE_METADATA_URL, timeout, false, true).await?;
    let parsed: AzureMetadataDocument = serde_json::from_str(&body).ok()?;
    Some(CloudFacts {
        platform: Some("azure_vm".to_string()),
        region: parsed.compute.location,
        instance_id: parsed.compute.vm_id,
        availability_zone: parsed.compute.zone,
        instance_type: parsed.compute.vm_size,
    })
}

/// Metadata enrichment processor (`nrenrich`).
pub struct EnrichmentProcessor {
    config: EnrichmentConfig,
    snapshot: ArcSwap<EnrichmentSnapshot>,
}

impl EnrichmentProcessor {
    /// Builds a processor with an empty snapshot; call `refresh` (or await
    /// `refresh_now`) before traffic flows so cloud/host attributes are
    /// populated, though an empty snapshot is safe to process against (it
    /// just contributes no cloud/host attributes yet).
    #[must_use]
    pub fn new(config: EnrichmentConfig) -> Self {
        Self {
            config,
            snapshot: ArcSwap::from_pointee(EnrichmentSnapshot::default()),
        }
    }

    /// The configured cache TTL.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        if self.config.cache_ttl.is_zero() {
            DEFAULT_CACHE_TTL
        } else {
            self.config.cache_ttl
        }
    }

    /// `true` if the currently published snapshot is older than the TTL (or
    /// none has ever been published) and a refresh should be attempted.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        match self.snapshot.load().refreshed_at {
            Some(at) => at.elapsed() >= self.cache_ttl(),
            None => true,
        }
    }

    /// Publishes a freshly probed snapshot. Host facts are only collected
    /// once (lazily, on the first refresh) since they don't change
    /// mid-process; every call re-probes cloud/orchestrator state since
    /// those can attach/detach (rare, but cheap enough to re-check each
    /// TTL window).
    pub async fn refresh(&self, client: &reqwest::Client, probe_timeout: Duration) {
        let previous = self.snapshot.load();
        let host_attributes = if previous.host_attributes.is_empty() {
            collect_host_attributes()
        } else {
            previous.host_attributes.clone()
        };

        let cloud_attributes = match probe_cloud_provider(client, probe_timeout).await {
            Some((provider, facts)) => cloud_attribute_map(provider, &facts),
            None => BTreeMap::new(),
        };
        let k8s_attributes = collect_k8s_attributes();

        debug!(
            cloud_detected = !cloud_attributes.is_empty(),
            k8s_detected = !k8s_attributes.is_empty(),
            "refreshed enrichment snapshot"
        );

        self.snapshot.store(std::sync::Arc::new(EnrichmentSnapshot {
            host_attributes,
            cloud_attributes,
            k8s_attributes,
            refreshed_at: Some(Instant::now()),
        }));
    }

    fn insert_if_absent(target: &mut AttributeMap, key: &str, value: String) {
        target.entry(key.to_string()).or_insert(AttributeValue::Str(value));
    }

    /// Enriches every item's resource attributes in `batch` from the
    /// currently published snapshot plus the configured static attributes
    /// and conditional rules. Never overwrites a pre-existing key and never
    /// removes one (enrichment non-clobber, §8).
    pub fn process(&self, batch: &mut TelemetryBatch) {
        let snapshot = self.snapshot.load();

        let mut rules = self.config.conditional_rules.clone();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        for scoped in &mut batch.items {
            for (k, v) in &self.config.static_attributes {
                Self::insert_if_absent(&mut scoped.resource_attributes, k, v.clone());
            }
            for (k, v) in &snapshot.host_attributes {
                Self::insert_if_absent(&mut scoped.resource_attributes, k, v.clone());
            }
            for (k, v) in &snapshot.cloud_attributes {
                Self::insert_if_absent(&mut scoped.resource_attributes, k, v.clone());
            }
            for (k, v) in &snapshot.k8s_attributes {
                Self::insert_if_absent(&mut scoped.resource_attributes, k, v.clone());
            }

            if rules.is_empty() {
                continue;
            }
            let mut merged = scoped.resource_attributes.clone();
            for (k, v) in scoped.item.attributes() {
                merged.entry(k.clone()).or_insert_with(|| v.clone());
            }
            for rule in &rules {
                if rule.predicate.matches(&merged) {
                    for (k, v) in &rule.attributes {
                        Self::insert_if_absent(&mut scoped.resource_attributes, k, v.clone());
                    }
                }
            }
        }
    }
}

/// Serializable mirror of `ConditionalRule`/`Predicate` used only to read
/// enrichment rules back out of a rendered descriptor's processor config
/// (the config engine stores them as opaque JSON); kept separate from the
/// runtime types above so the hot per-item path never touches `serde`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalRuleSpec {
    /// See `ConditionalRule::priority`.
    pub priority: i32,
    /// Predicate key.
    pub key: String,
    /// Predicate expected value; `None` means "key exists" rather than
    /// "key equals".
    pub equals: Option<String>,
    /// Attributes to add.
    pub attributes: Vec<(String, String)>,
}

impl From<ConditionalRuleSpec> for ConditionalRule {
    fn from(spec: ConditionalRuleSpec) -> Self {
        let predicate = match spec.equals {
            Some(value) => Predicate::KeyEquals(spec.key, value),
            None => Predicate::KeyExists(spec.key),
        };
        ConditionalRule {
            priority: spec.priority,
            predicate,
            attributes: spec.attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap as Map;

    use nrdot_types::batch::{LogRecord, ResourceScoped};

    use super::*;

    fn log_batch() -> TelemetryBatch {
        TelemetryBatch {
            kind: Some(nrdot_types::descriptor::PipelineKind::Logs),
            items: vec![ResourceScoped {
                resource_attributes: Map::new(),
                item: TelemetryItem::Log(LogRecord {
                    body: Some("hi".to_string()),
                    severity: None,
                    attributes: Map::new(),
                }),
            }],
        }
    }

    #[test]
    fn static_attributes_are_added_without_clobbering() {
        let mut batch = log_batch();
        batch.items[0]
            .resource_attributes
            .insert("service.name".to_string(), AttributeValue::Str("preexisting".to_string()));

        let config = EnrichmentConfig {
            static_attributes: vec![
                ("service.name".to_string(), "should-not-win".to_string()),
                ("deployment.environment".to_string(), "prod".to_string()),
            ],
            conditional_rules: Vec::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
        };
        let processor = EnrichmentProcessor::new(config);
        processor.process(&mut batch);

        let attrs = &batch.items[0].resource_attributes;
        assert_eq!(attrs["service.name"], AttributeValue::Str("preexisting".to_string()));
        assert_eq!(attrs["deployment.environment"], AttributeValue::Str("prod".to_string()));
    }

    #[test]
    fn enrichment_never_decreases_key_count() {
        let mut batch = log_batch();
        let before = batch.items[0].resource_attributes.len();
        let config = EnrichmentConfig {
            static_attributes: vec![("a".to_string(), "1".to_string())],
            conditional_rules: Vec::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
        };
        EnrichmentProcessor::new(config).process(&mut batch);
        assert!(batch.items[0].resource_attributes.len() >= before);
    }

    #[test]
    fn higher_priority_conditional_rule_wins_on_conflict() {
        let config = EnrichmentConfig {
            static_attributes: Vec::new(),
            conditional_rules: vec![
                ConditionalRule {
                    priority: 1,
                    predicate: Predicate::KeyExists("service.name".to_string()),
                    attributes: vec![("tier".to_string(), "low-priority".to_string())],
                },
                ConditionalRule {
                    priority: 10,
                    predicate: Predicate::KeyExists("service.name".to_string()),
                    attributes: vec![("tier".to_string(), "high-priority".to_string())],
                },
            ],
            cache_ttl: DEFAULT_CACHE_TTL,
        };
        let mut batch = log_batch();
        batch.items[0]
            .resource_attributes
            .insert("service.name".to_string(), AttributeValue::Str("api".to_string()));

        EnrichmentProcessor::new(config).process(&mut batch);
        assert_eq!(
            batch.items[0].resource_attributes["tier"],
            AttributeValue::Str("high-priority".to_string())
        );
    }

    #[test]
    fn needs_refresh_is_true_before_first_refresh() {
        let processor = EnrichmentProcessor::new(EnrichmentConfig::default());
        assert!(processor.needs_refresh());
    }
}
