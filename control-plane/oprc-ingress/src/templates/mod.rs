mod ingress;

pub use ingress::IngressTemplate;
