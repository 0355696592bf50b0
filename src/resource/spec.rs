use std::{collections::BTreeMap, fmt};

use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use kube_core::ResourceExt;
use serde::Deserialize;

use crate::{config::Configuration, subscriber::QualifiedName};

const ANNOTATION_PREFIX: &str = "alb.ingress.kubernetes.io/";

/// Desired state of one load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerSpec {
    pub scheme: Scheme,
    /// Sorted by port.
    pub listeners: Vec<Listener>,
    /// In declaration order, which is also evaluation order.
    pub rules: Vec<RoutingRule>,
    pub default_target: Option<Target>,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Internal,
    InternetFacing,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Internal => "internal",
            Self::InternetFacing => "internet-facing",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub protocol: Protocol,
    pub port: u16,
    /// Only set for HTTPS listeners.
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    pub host: Option<String>,
    pub path: Option<String>,
    pub target: Target,
}

/// The service receiving traffic for a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub service: String,
    pub port: TargetPort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPort {
    Number(i32),
    Name(String),
}

/// Reasons an ingress cannot be turned into a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIngress {
    #[error("metadata.name is missing")]
    MissingName,
    #[error("no rules and no default backend")]
    NoBackend,
    #[error("backend of path {path:?} is not a service")]
    NotAService { path: String },
    #[error("service backend {service:?} has no port")]
    MissingServicePort { service: String },
    #[error("unknown scheme {0:?}")]
    UnknownScheme(String),
    #[error("scheme internet-facing is only allowed in namespace {allowed:?}")]
    SchemeRestricted { allowed: String },
    #[error("malformed listen-ports annotation: {0}")]
    ListenPorts(String),
    #[error("malformed tags annotation entry {0:?}")]
    Tags(String),
    #[error("HTTPS listener on port {0} has no certificate")]
    MissingCertificate(u16),
}

impl LoadBalancerSpec {
    /// Derives the desired load balancer from an ingress and its `alb.ingress.kubernetes.io/` annotations.
    pub fn from_ingress(ingress: &Ingress, cfg: &Configuration) -> Result<Self, InvalidIngress> {
        if ingress.metadata.name.as_deref().map_or(true, str::is_empty) {
            return Err(InvalidIngress::MissingName);
        }
        let source = QualifiedName::from_resource(ingress);
        let annotation = |name: &str| {
            ingress
                .annotations()
                .get(&format!("{ANNOTATION_PREFIX}{name}"))
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        let scheme = match annotation("scheme") {
            None | Some("internal") => Scheme::Internal,
            Some("internet-facing") => Scheme::InternetFacing,
            Some(other) => return Err(InvalidIngress::UnknownScheme(other.to_owned())),
        };
        if scheme == Scheme::InternetFacing
            && cfg.restrict_scheme()
            && source.namespace_or_default() != cfg.restrict_scheme_namespace()
        {
            return Err(InvalidIngress::SchemeRestricted {
                allowed: cfg.restrict_scheme_namespace().to_owned(),
            });
        }

        let certificate = annotation("certificate-arn").or(cfg.default_ssl_certificate());
        let listeners = parse_listeners(annotation("listen-ports"), certificate)?;

        let spec = ingress.spec.as_ref();
        let default_target = spec
            .and_then(|spec| spec.default_backend.as_ref())
            .map(|backend| target(backend, "/"))
            .transpose()?;

        let mut rules = Vec::new();
        for rule in spec.and_then(|spec| spec.rules.as_ref()).into_iter().flatten() {
            let host = rule.host.clone().filter(|host| !host.is_empty());
            for path in rule.http.iter().flat_map(|http| &http.paths) {
                let display_path = path.path.as_deref().unwrap_or("/");
                rules.push(RoutingRule {
                    host: host.clone(),
                    path: path.path.clone(),
                    target: target(&path.backend, display_path)?,
                });
            }
        }
        if rules.is_empty() && default_target.is_none() {
            return Err(InvalidIngress::NoBackend);
        }

        let mut tags = parse_tags(annotation("tags"))?;
        tags.insert(
            format!("kubernetes.io/cluster/{}", cfg.cluster_name()),
            "owned".to_owned(),
        );
        tags.insert(
            "kubernetes.io/namespace".to_owned(),
            source.namespace_or_default().to_owned(),
        );
        tags.insert("kubernetes.io/ingress-name".to_owned(), source.name);

        Ok(Self {
            scheme,
            listeners,
            rules,
            default_target,
            subnets: split_list(annotation("subnets")),
            security_groups: split_list(annotation("security-groups")),
            tags,
        })
    }

    #[cfg(test)]
    pub(crate) fn test_http(port: u16) -> Self {
        Self {
            scheme: Scheme::Internal,
            listeners: vec![Listener {
                protocol: Protocol::Http,
                port,
                certificate: None,
            }],
            rules: Vec::new(),
            default_target: Some(Target {
                service: "web".to_owned(),
                port: TargetPort::Number(80),
            }),
            subnets: Vec::new(),
            security_groups: Vec::new(),
            tags: BTreeMap::new(),
        }
    }
}

fn target(backend: &IngressBackend, path: &str) -> Result<Target, InvalidIngress> {
    let service = backend
        .service
        .as_ref()
        .ok_or_else(|| InvalidIngress::NotAService {
            path: path.to_owned(),
        })?;
    let port = service.port.as_ref().and_then(|port| {
        port.number.map(TargetPort::Number).or_else(|| {
            port.name
                .clone()
                .filter(|name| !name.is_empty())
                .map(TargetPort::Name)
        })
    });

    Ok(Target {
        service: service.name.clone(),
        port: port.ok_or_else(|| InvalidIngress::MissingServicePort {
            service: service.name.clone(),
        })?,
    })
}

/// Parses `[{"HTTP": 80}, {"HTTPS": 443}]`.
fn parse_listeners(
    annotation: Option<&str>,
    certificate: Option<&str>,
) -> Result<Vec<Listener>, InvalidIngress> {
    let Some(annotation) = annotation else {
        return Ok(vec![Listener {
            protocol: Protocol::Http,
            port: 80,
            certificate: None,
        }]);
    };

    let entries: Vec<BTreeMap<Protocol, u16>> = serde_json::from_str(annotation)
        .map_err(|err| InvalidIngress::ListenPorts(err.to_string()))?;

    let mut listeners = Vec::new();
    for (protocol, port) in entries.into_iter().flatten() {
        let certificate = match protocol {
            Protocol::Http => None,
            Protocol::Https => Some(
                certificate
                    .ok_or(InvalidIngress::MissingCertificate(port))?
                    .to_owned(),
            ),
        };
        listeners.push(Listener {
            protocol,
            port,
            certificate,
        });
    }
    if listeners.is_empty() {
        return Err(InvalidIngress::ListenPorts("no listeners declared".to_owned()));
    }

    listeners.sort_by_key(|listener| (listener.port, listener.protocol));
    listeners.dedup();
    if let Some(pair) = listeners.windows(2).find(|pair| pair[0].port == pair[1].port) {
        return Err(InvalidIngress::ListenPorts(format!(
            "port {} declared with more than one protocol",
            pair[0].port
        )));
    }
    Ok(listeners)
}

/// Parses `key=value,key2=value2`.
fn parse_tags(annotation: Option<&str>) -> Result<BTreeMap<String, String>, InvalidIngress> {
    let mut tags = BTreeMap::new();
    for entry in annotation.into_iter().flat_map(|tags| tags.split(',')) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                tags.insert(key.trim().to_owned(), value.trim().to_owned());
            }
            _ => return Err(InvalidIngress::Tags(entry.to_owned())),
        }
    }
    Ok(tags)
}

fn split_list(annotation: Option<&str>) -> Vec<String> {
    annotation
        .into_iter()
        .flat_map(|list| list.split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
