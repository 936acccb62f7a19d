//! 集成测试共用的内存 SQLite 库：phage / gene / trna 以及孤立的 version 表

use std::sync::Arc;

use genome_query::core::builder::Statement;
use genome_query::core::graph::SchemaGraph;
use genome_query::infra::db_external::DynamicPool;
use genome_query::models::schema::DataSource;
use genome_query::models::value::Value;

pub struct Fixture {
    pub pool: DynamicPool,
    pub graph: Arc<SchemaGraph>,
}

const DDL: &[&str] = &[
    "CREATE TABLE phage (
        PhageID VARCHAR(25) PRIMARY KEY,
        Cluster VARCHAR(5),
        Subcluster VARCHAR(5)
    )",
    "CREATE TABLE gene (
        GeneID VARCHAR(35) PRIMARY KEY,
        PhageID VARCHAR(25) NOT NULL REFERENCES phage (PhageID),
        PhamID INTEGER
    )",
    "CREATE TABLE trna (
        GeneID VARCHAR(35) PRIMARY KEY,
        PhageID VARCHAR(25) NOT NULL REFERENCES phage (PhageID),
        AminoAcid VARCHAR(5)
    )",
    "CREATE TABLE version (Version INTEGER PRIMARY KEY, SchemaVersion INTEGER)",
];

fn phage(id: &str, cluster: &str, subcluster: Option<&str>) -> Statement {
    Statement::new("INSERT INTO phage (PhageID, Cluster, Subcluster) VALUES (?, ?, ?)")
        .bind(id)
        .bind(cluster)
        .bind(subcluster.map(Value::from).unwrap_or(Value::Null))
}

fn gene(id: &str, phage: &str, pham: i64) -> Statement {
    Statement::new("INSERT INTO gene (GeneID, PhageID, PhamID) VALUES (?, ?, ?)")
        .bind(id)
        .bind(phage)
        .bind(pham)
}

fn trna(id: &str, phage: &str, amino_acid: &str) -> Statement {
    Statement::new("INSERT INTO trna (GeneID, PhageID, AminoAcid) VALUES (?, ?, ?)")
        .bind(id)
        .bind(phage)
        .bind(amino_acid)
}

pub async fn phamerator() -> Fixture {
    let source = DataSource {
        id: "test".to_string(),
        db_type: "sqlite".to_string(),
        connection_url: "sqlite::memory:".to_string(),
        display_name: "test".to_string(),
    };
    let pool = DynamicPool::connect(&source).await.expect("connect sqlite");

    let mut statements: Vec<Statement> = DDL.iter().map(|s| Statement::new(*s)).collect();
    statements.extend([
        phage("Trixie", "A", Some("A2")),
        phage("D29", "A", Some("A2")),
        phage("L5", "A", Some("A1")),
        phage("Alice", "B", Some("B1")),
        phage("Myrna", "Singleton", None),
        gene("Trixie_CDS_1", "Trixie", 10),
        gene("Trixie_CDS_2", "Trixie", 20),
        gene("D29_CDS_1", "D29", 10),
        gene("L5_CDS_1", "L5", 50),
        gene("Alice_CDS_1", "Alice", 20),
        gene("Myrna_CDS_1", "Myrna", 30),
        trna("Trixie_tRNA_1", "Trixie", "Ala"),
        trna("D29_tRNA_1", "D29", "Gly"),
        Statement::new("INSERT INTO version (Version, SchemaVersion) VALUES (1, 9)"),
    ]);
    pool.execute_transaction(&statements).await.expect("load fixture");

    let metadata = pool.reflect_schema().await.expect("reflect schema");
    let graph = Arc::new(SchemaGraph::build(metadata).expect("build graph"));
    Fixture { pool, graph }
}

pub fn texts(values: &[Value]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
