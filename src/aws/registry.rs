//! Connection registry
//!
//! The AWS SDK uses a separate client per service. This module caches
//! one client per (region, service) pair, built lazily with the current
//! credentials. Swapping credentials drops every cached client, since
//! clients are bound to their credentials at construction time.
//!
//! Looking up a region that is not yet known triggers a one-time refresh
//! of the region list via `DescribeRegions`; a name that is still
//! unknown afterwards is an input error.

use std::collections::HashMap;

use crate::aws::credentials::AwsCredentials;
use crate::error::CmdError;

/// IAM is a global service; its clients are pinned here regardless of
/// the region whose holder caches them.
pub const IAM_REGION: &str = "aws-global";

/// Region used to bootstrap the `DescribeRegions` lookup.
const BOOTSTRAP_REGION: &str = "us-east-1";

/// Fallback when the region list cannot be fetched.
const STATIC_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "sa-east-1",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Ec2,
    Iam,
    Rds,
    Elb,
}

#[derive(Default)]
struct ServiceHandles {
    ec2: Option<aws_sdk_ec2::Client>,
    iam: Option<aws_sdk_iam::Client>,
    rds: Option<aws_sdk_rds::Client>,
    elb: Option<aws_sdk_elasticloadbalancing::Client>,
}

pub struct ConnectionRegistry {
    creds: AwsCredentials,
    // Key: region-name. An entry existing means the region name is
    // valid; its handles fill in on first use.
    regions: HashMap<String, ServiceHandles>,
    have_region_names: bool,
    endpoint_url: Option<String>,
}

impl ConnectionRegistry {
    pub fn new(creds: AwsCredentials) -> Self {
        Self {
            creds,
            regions: HashMap::new(),
            have_region_names: false,
            endpoint_url: None,
        }
    }

    /// Route all clients at the given endpoint instead of the real AWS
    /// endpoints (integration tests, localstack-style setups).
    pub fn with_endpoint_url(creds: AwsCredentials, url: impl Into<String>) -> Self {
        let mut registry = Self::new(creds);
        registry.endpoint_url = Some(url.into());
        registry
    }

    pub fn credentials(&self) -> &AwsCredentials {
        &self.creds
    }

    /// Swap credentials and forget every cached client and region name.
    pub fn set_credentials(&mut self, creds: AwsCredentials) {
        self.creds = creds;
        self.regions.clear();
        self.have_region_names = false;
    }

    /// Relabel the current credentials; does not invalidate anything.
    pub fn set_credentials_name(&mut self, name: Option<String>) {
        self.creds.name = name;
    }

    /// All known region names, fetching the list if needed.
    pub async fn region_names(&mut self) -> Vec<String> {
        self.find_regions().await;
        let mut names: Vec<String> = self.regions.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn ec2(&mut self, region: &str) -> Result<aws_sdk_ec2::Client, CmdError> {
        self.ensure_region(region).await?;
        if let Some(client) = self.regions.get(region).and_then(|h| h.ec2.clone()) {
            return Ok(client);
        }
        let client = self.build_ec2(region);
        if let Some(holder) = self.regions.get_mut(region) {
            holder.ec2 = Some(client.clone());
        }
        Ok(client)
    }

    pub async fn iam(&mut self, region: &str) -> Result<aws_sdk_iam::Client, CmdError> {
        self.ensure_region(region).await?;
        if let Some(client) = self.regions.get(region).and_then(|h| h.iam.clone()) {
            return Ok(client);
        }
        let mut builder = aws_sdk_iam::config::Builder::new()
            .behavior_version(aws_sdk_iam::config::BehaviorVersion::latest())
            .region(aws_sdk_iam::config::Region::new(IAM_REGION))
            .credentials_provider(self.creds.provider());
        if let Some(url) = &self.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        let client = aws_sdk_iam::Client::from_conf(builder.build());
        if let Some(holder) = self.regions.get_mut(region) {
            holder.iam = Some(client.clone());
        }
        Ok(client)
    }

    pub async fn rds(&mut self, region: &str) -> Result<aws_sdk_rds::Client, CmdError> {
        self.ensure_region(region).await?;
        if let Some(client) = self.regions.get(region).and_then(|h| h.rds.clone()) {
            return Ok(client);
        }
        let mut builder = aws_sdk_rds::config::Builder::new()
            .behavior_version(aws_sdk_rds::config::BehaviorVersion::latest())
            .region(aws_sdk_rds::config::Region::new(region.to_string()))
            .credentials_provider(self.creds.provider());
        if let Some(url) = &self.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        let client = aws_sdk_rds::Client::from_conf(builder.build());
        if let Some(holder) = self.regions.get_mut(region) {
            holder.rds = Some(client.clone());
        }
        Ok(client)
    }

    pub async fn elb(
        &mut self,
        region: &str,
    ) -> Result<aws_sdk_elasticloadbalancing::Client, CmdError> {
        self.ensure_region(region).await?;
        if let Some(client) = self.regions.get(region).and_then(|h| h.elb.clone()) {
            return Ok(client);
        }
        let mut builder = aws_sdk_elasticloadbalancing::config::Builder::new()
            .behavior_version(aws_sdk_elasticloadbalancing::config::BehaviorVersion::latest())
            .region(aws_sdk_elasticloadbalancing::config::Region::new(
                region.to_string(),
            ))
            .credentials_provider(self.creds.provider());
        if let Some(url) = &self.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        let client = aws_sdk_elasticloadbalancing::Client::from_conf(builder.build());
        if let Some(holder) = self.regions.get_mut(region) {
            holder.elb = Some(client.clone());
        }
        Ok(client)
    }

    #[cfg(test)]
    fn is_cached(&self, region: &str, kind: ServiceKind) -> bool {
        let Some(holder) = self.regions.get(region) else {
            return false;
        };
        match kind {
            ServiceKind::Ec2 => holder.ec2.is_some(),
            ServiceKind::Iam => holder.iam.is_some(),
            ServiceKind::Rds => holder.rds.is_some(),
            ServiceKind::Elb => holder.elb.is_some(),
        }
    }

    async fn ensure_region(&mut self, region: &str) -> Result<(), CmdError> {
        if self.regions.contains_key(region) {
            return Ok(());
        }
        self.find_regions().await;
        if !self.regions.contains_key(region) {
            return Err(CmdError::input(format!(
                "{region} is not a valid region name"
            )));
        }
        Ok(())
    }

    async fn find_regions(&mut self) {
        if self.have_region_names {
            return;
        }
        let client = self.build_ec2(BOOTSTRAP_REGION);
        match client.describe_regions().send().await {
            Ok(output) => {
                for region in output.regions() {
                    if let Some(name) = region.region_name() {
                        self.regions.entry(name.to_string()).or_default();
                    }
                }
                tracing::debug!("loaded {} region names", self.regions.len());
            }
            Err(err) => {
                tracing::warn!("failed to list regions, using static list: {err}");
                for name in STATIC_REGIONS {
                    self.regions.entry((*name).to_string()).or_default();
                }
            }
        }
        self.have_region_names = true;
    }

    fn build_ec2(&self, region: &str) -> aws_sdk_ec2::Client {
        let mut builder = aws_sdk_ec2::config::Builder::new()
            .behavior_version(aws_sdk_ec2::config::BehaviorVersion::latest())
            .region(aws_sdk_ec2::config::Region::new(region.to_string()))
            .credentials_provider(self.creds.provider());
        if let Some(url) = &self.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        aws_sdk_ec2::Client::from_conf(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REGIONS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeRegionsResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>11111111-2222-3333-4444-555555555555</requestId>
  <regionInfo>
    <item>
      <regionName>us-east-1</regionName>
      <regionEndpoint>ec2.us-east-1.amazonaws.com</regionEndpoint>
    </item>
    <item>
      <regionName>eu-west-1</regionName>
      <regionEndpoint>ec2.eu-west-1.amazonaws.com</regionEndpoint>
    </item>
  </regionInfo>
</DescribeRegionsResponse>"#;

    fn test_creds() -> AwsCredentials {
        AwsCredentials {
            key_id: "AKIATEST".to_string(),
            secret: "secret".to_string(),
            source_file: None,
            name: None,
        }
    }

    async fn mock_regions(server: &MockServer) {
        Mock::given(method("POST"))
            .and(body_string_contains("Action=DescribeRegions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(REGIONS_XML, "text/xml"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn second_get_returns_cached_client() {
        let server = MockServer::start().await;
        mock_regions(&server).await;

        let mut registry = ConnectionRegistry::with_endpoint_url(test_creds(), server.uri());
        assert!(!registry.is_cached("us-east-1", ServiceKind::Ec2));

        registry.ec2("us-east-1").await.unwrap();
        assert!(registry.is_cached("us-east-1", ServiceKind::Ec2));
        registry.ec2("us-east-1").await.unwrap();

        // The region list was fetched exactly once; client construction
        // itself never touches the network.
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn credential_change_drops_cached_clients() {
        let server = MockServer::start().await;
        mock_regions(&server).await;

        let mut registry = ConnectionRegistry::with_endpoint_url(test_creds(), server.uri());
        registry.ec2("eu-west-1").await.unwrap();
        registry.elb("eu-west-1").await.unwrap();
        assert!(registry.is_cached("eu-west-1", ServiceKind::Ec2));
        assert!(registry.is_cached("eu-west-1", ServiceKind::Elb));

        let mut new_creds = test_creds();
        new_creds.key_id = "AKIAOTHER".to_string();
        registry.set_credentials(new_creds);
        assert!(!registry.is_cached("eu-west-1", ServiceKind::Ec2));
        assert!(!registry.is_cached("eu-west-1", ServiceKind::Elb));

        // A new handle is built (and the region list re-fetched) on the
        // next use.
        registry.ec2("eu-west-1").await.unwrap();
        assert!(registry.is_cached("eu-west-1", ServiceKind::Ec2));
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn unknown_region_fails_after_one_refresh() {
        let server = MockServer::start().await;
        mock_regions(&server).await;

        let mut registry = ConnectionRegistry::with_endpoint_url(test_creds(), server.uri());
        let err = registry.ec2("mars-north-1").await.unwrap_err();
        assert!(matches!(err, CmdError::Input(_)));
        assert!(err.to_string().contains("mars-north-1"));

        // The refresh is one-time: a second bad lookup does not refetch.
        let _ = registry.ec2("mars-north-1").await.unwrap_err();
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn iam_clients_are_cached_per_region_entry() {
        let server = MockServer::start().await;
        mock_regions(&server).await;

        let mut registry = ConnectionRegistry::with_endpoint_url(test_creds(), server.uri());
        registry.iam("us-east-1").await.unwrap();
        assert!(registry.is_cached("us-east-1", ServiceKind::Iam));
        assert!(!registry.is_cached("us-east-1", ServiceKind::Ec2));
    }
}
