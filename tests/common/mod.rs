//! Shared helpers for the integration suites
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use reqwest::Url;

use xml_validator::{
    ContentLoader, LoadError, ResolverOptions, SchemaReference, ServiceOptions,
    XmlValidationService,
};

pub const BASE: &str = "http://schemas.test/";

/// In-memory loader serving fixed documents by URL
#[derive(Default)]
pub struct StaticLoader {
    documents: HashMap<String, String>,
    loads: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    delay: Option<Duration>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `text` at `BASE` + `path`
    pub fn with(mut self, path: &str, text: &str) -> Self {
        self.documents.insert(url(path).to_string(), text.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn loads_of(&self, path: &str) -> usize {
        self.loads
            .lock()
            .unwrap()
            .get(url(path).as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentLoader for StaticLoader {
    async fn load(&self, location: &Url) -> Result<String, LoadError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .loads
            .lock()
            .unwrap()
            .entry(location.to_string())
            .or_default() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.documents
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                url: location.to_string(),
            })
    }
}

mock! {
    pub Loader {}

    #[async_trait]
    impl ContentLoader for Loader {
        async fn load(&self, location: &Url) -> Result<String, LoadError>;
    }
}

pub fn url(path: &str) -> Url {
    Url::parse(BASE).unwrap().join(path).unwrap()
}

pub fn schema(path: &str) -> SchemaReference {
    SchemaReference::new(url(path))
}

pub fn service_with(loader: Arc<dyn ContentLoader>) -> XmlValidationService {
    XmlValidationService::new(
        loader.clone(),
        loader,
        ResolverOptions::default(),
        ServiceOptions::default(),
    )
}

pub fn service(loader: StaticLoader) -> XmlValidationService {
    service_with(Arc::new(loader))
}

/// Root schema that only imports the invoice namespace
pub const ROOT_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:inv="urn:example:invoice"
           targetNamespace="urn:example:root"
           elementFormDefault="qualified">
  <xs:import namespace="urn:example:invoice" schemaLocation="invoice.xsd"/>
</xs:schema>"#;

/// Invoice namespace, itself importing shared types
pub const INVOICE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:cmn="urn:example:common"
           xmlns="urn:example:invoice"
           targetNamespace="urn:example:invoice"
           elementFormDefault="qualified">
  <xs:import namespace="urn:example:common" schemaLocation="common/types.xsd"/>

  <xs:element name="Invoice">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="Line" minOccurs="0" maxOccurs="unbounded">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="Description" type="xs:string"/>
              <xs:element name="Amount" type="cmn:Money"/>
            </xs:sequence>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
      <xs:attribute name="id" type="xs:string" use="required"/>
      <xs:attribute name="currency" type="cmn:CurrencyCode"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

/// Leaf namespace with the simple types
pub const COMMON_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:example:common">
  <xs:simpleType name="Money">
    <xs:restriction base="xs:decimal">
      <xs:minInclusive value="0"/>
      <xs:fractionDigits value="2"/>
    </xs:restriction>
  </xs:simpleType>

  <xs:simpleType name="CurrencyCode">
    <xs:restriction base="xs:string">
      <xs:pattern value="[A-Z]{3}"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

/// Loader serving the three-level invoice schema set
pub fn invoice_loader() -> StaticLoader {
    StaticLoader::new()
        .with("root.xsd", ROOT_XSD)
        .with("invoice.xsd", INVOICE_XSD)
        .with("common/types.xsd", COMMON_XSD)
}
