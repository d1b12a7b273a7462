use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use divan::Bencher;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use xml_validator::{
    CompiledSchema, ContentLoader, LoadError, ResolverOptions, SchemaReference, SchemaSet,
    SchemaSetResolver, ValidationEngine,
};

fn main() {
    divan::main();
}

const ROOT_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:cmn="urn:bench:common"
           targetNamespace="urn:bench:order"
           elementFormDefault="qualified">
    <xs:import namespace="urn:bench:common" schemaLocation="common.xsd"/>
    <xs:element name="order">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="item" maxOccurs="unbounded">
                    <xs:complexType>
                        <xs:sequence>
                            <xs:element name="sku" type="cmn:Sku"/>
                            <xs:element name="quantity" type="xs:positiveInteger"/>
                            <xs:element name="price" type="cmn:Money"/>
                        </xs:sequence>
                    </xs:complexType>
                </xs:element>
            </xs:sequence>
            <xs:attribute name="id" type="xs:ID" use="required"/>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

const COMMON_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:bench:common">
    <xs:simpleType name="Sku">
        <xs:restriction base="xs:string">
            <xs:pattern value="[A-Z]{2}-[0-9]{4}"/>
        </xs:restriction>
    </xs:simpleType>
    <xs:simpleType name="Money">
        <xs:restriction base="xs:decimal">
            <xs:minInclusive value="0"/>
            <xs:fractionDigits value="2"/>
        </xs:restriction>
    </xs:simpleType>
</xs:schema>"#;

struct MemoryLoader(HashMap<String, String>);

#[async_trait]
impl ContentLoader for MemoryLoader {
    async fn load(&self, location: &Url) -> Result<String, LoadError> {
        self.0
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                url: location.to_string(),
            })
    }
}

fn loader() -> Arc<MemoryLoader> {
    let mut documents = HashMap::new();
    documents.insert("http://bench.test/order.xsd".to_string(), ROOT_XSD.to_string());
    documents.insert("http://bench.test/common.xsd".to_string(), COMMON_XSD.to_string());
    Arc::new(MemoryLoader(documents))
}

fn root() -> SchemaReference {
    SchemaReference::new(Url::parse("http://bench.test/order.xsd").unwrap())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn schema_set() -> SchemaSet {
    let resolver = SchemaSetResolver::new(loader(), ResolverOptions::default());
    runtime().block_on(resolver.resolve(&root())).unwrap()
}

fn order(items: usize) -> String {
    let mut xml = String::from(r#"<order xmlns="urn:bench:order" id="o1">"#);
    for n in 0..items {
        xml.push_str(&format!(
            "<item><sku>AB-{:04}</sku><quantity>{}</quantity><price>{}.99</price></item>",
            n % 10_000,
            n + 1,
            n
        ));
    }
    xml.push_str("</order>");
    xml
}

#[divan::bench]
fn resolve_schema_set(bencher: Bencher) {
    let rt = runtime();
    let resolver = SchemaSetResolver::new(loader(), ResolverOptions::default());
    let reference = root();

    bencher.bench_local(|| rt.block_on(resolver.resolve(&reference)).unwrap());
}

#[divan::bench]
fn compile_schema_set(bencher: Bencher) {
    let set = schema_set();
    bencher.bench_local(|| CompiledSchema::compile(&set).unwrap());
}

#[divan::bench(args = [10, 1_000, 10_000])]
fn validate_order(bencher: Bencher, items: usize) {
    let compiled = CompiledSchema::compile(&schema_set()).unwrap();
    let engine = ValidationEngine::new(&compiled);
    let document = order(items);
    let cancel = CancellationToken::new();

    bencher.bench_local(|| engine.validate(&document, &cancel).unwrap());
}

#[divan::bench]
fn validate_malformed(bencher: Bencher) {
    let compiled = CompiledSchema::compile(&schema_set()).unwrap();
    let engine = ValidationEngine::new(&compiled);
    let mut document = order(1_000);
    document.truncate(document.len() - "</order>".len());
    let cancel = CancellationToken::new();

    bencher.bench_local(|| engine.validate(&document, &cancel).unwrap());
}
