use indexmap::IndexMap;

use super::ManifestError;

/// One logical service and the port it is reached on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceEntry {
    pub port: u16,
    /// Served by the GPU sidecar rather than the primary application
    pub accelerated: bool,
}

/// Service name to port mapping for a deployment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceTopology {
    services: IndexMap<String, ServiceEntry>,
}

impl ServiceTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// The platform's services, plus the sidecar's when it is enabled
    pub fn standard(with_sidecar: bool) -> Self {
        let mut topology = Self::new();
        topology.insert("agixt", 7437, false);
        topology.insert("streamlit", 8501, false);
        topology.insert("api", 7437, false);
        if with_sidecar {
            topology.insert("ezlocalai_api", 8091, true);
            topology.insert("ezlocalai_gui", 8502, true);
        }
        topology
    }

    /// Add a service served by the primary application
    pub fn with_service(self, name: &str, port: u16) -> Result<Self, ManifestError> {
        self.with_entry(name, port, false)
    }

    /// Add a service served by the GPU sidecar
    pub fn with_accelerated_service(self, name: &str, port: u16) -> Result<Self, ManifestError> {
        self.with_entry(name, port, true)
    }

    fn with_entry(mut self, name: &str, port: u16, accelerated: bool) -> Result<Self, ManifestError> {
        if port == 0 {
            return Err(ManifestError::InvalidPort(name.to_string()));
        }
        if self.services.contains_key(name) {
            return Err(ManifestError::DuplicateService(name.to_string()));
        }
        self.insert(name, port, accelerated);
        Ok(self)
    }

    fn insert(&mut self, name: &str, port: u16, accelerated: bool) {
        self.services
            .insert(name.to_string(), ServiceEntry { port, accelerated });
    }

    pub fn get(&self, name: &str) -> Option<&ServiceEntry> {
        self.services.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceEntry)> {
        self.services.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Distinct ports in declaration order
    pub fn ports(&self) -> Vec<u16> {
        let mut ports = Vec::new();
        for entry in self.services.values() {
            if !ports.contains(&entry.port) {
                ports.push(entry.port);
            }
        }
        ports
    }

    pub fn has_accelerated(&self) -> bool {
        self.services.values().any(|e| e.accelerated)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_without_sidecar() {
        let topology = ServiceTopology::standard(false);
        assert_eq!(topology.len(), 3);
        assert!(!topology.has_accelerated());
        assert_eq!(topology.ports(), vec![7437, 8501]);
    }

    #[test]
    fn test_standard_with_sidecar() {
        let topology = ServiceTopology::standard(true);
        assert_eq!(topology.len(), 5);
        assert!(topology.get("ezlocalai_api").unwrap().accelerated);
        assert!(!topology.get("agixt").unwrap().accelerated);
        assert_eq!(topology.ports(), vec![7437, 8501, 8091, 8502]);
    }

    #[test]
    fn test_rejects_zero_port_and_duplicates() {
        assert!(matches!(
            ServiceTopology::new().with_service("api", 0),
            Err(ManifestError::InvalidPort(_))
        ));

        let result = ServiceTopology::new()
            .with_service("api", 7437)
            .and_then(|t| t.with_service("api", 7438));
        assert!(matches!(result, Err(ManifestError::DuplicateService(_))));
    }

    #[test]
    fn test_custom_topology() {
        let topology = ServiceTopology::new()
            .with_service("web", 3000)
            .and_then(|t| t.with_accelerated_service("infer", 9000))
            .unwrap();
        assert!(topology.has_accelerated());
        assert_eq!(topology.ports(), vec![3000, 9000]);
    }
}
