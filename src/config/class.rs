use k8s_openapi::api::networking::v1::Ingress;
use kube_core::ResourceExt;

/// Annotation selecting the controller responsible for an ingress.
pub const CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

const DEFAULT_CLASS: &str = "alb";

/// Decides which ingresses belong to this controller instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFilter {
    class: String,
    default_class: String,
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CLASS, DEFAULT_CLASS)
    }
}

impl ClassFilter {
    /// `class` is the class served by this instance;
    /// unclassified ingresses are served only if `class == default_class`.
    pub fn new(class: impl Into<String>, default_class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            default_class: default_class.into(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn default_class(&self) -> &str {
        &self.default_class
    }

    /// Returns whether the ingress should be managed by this instance.
    ///
    /// The annotation takes precedence over `spec.ingressClassName`.
    pub fn matches(&self, ingress: &Ingress) -> bool {
        let declared = ingress
            .annotations()
            .get(CLASS_ANNOTATION)
            .map(String::as_str)
            .or_else(|| {
                ingress
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.ingress_class_name.as_deref())
            })
            .filter(|class| !class.is_empty());

        match declared {
            Some(class) => class == self.class,
            None => self.class == self.default_class,
        }
    }
}
