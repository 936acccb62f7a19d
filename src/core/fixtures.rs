//! 单元测试共用的 schema：phage / gene / trna / domain 以及一张孤立的 version 表

use std::sync::Arc;

use crate::core::graph::SchemaGraph;
use crate::models::schema::{SchemaMetadata, TableMeta};

pub(crate) fn phamerator_schema() -> SchemaMetadata {
    SchemaMetadata::default()
        .table(
            TableMeta::new("phage")
                .column("PhageID", "varchar(25)", true)
                .column("Cluster", "varchar(5)", false)
                .column("Subcluster", "varchar(5)", false)
                .column("Length", "mediumint(9)", false)
                .column("DateLastModified", "datetime", false),
        )
        .table(
            TableMeta::new("gene")
                .column("GeneID", "varchar(35)", true)
                .column("PhageID", "varchar(25)", false)
                .column("PhamID", "int(10) unsigned", false)
                .column("Notes", "blob", false),
        )
        .table(
            TableMeta::new("trna")
                .column("GeneID", "varchar(35)", true)
                .column("PhageID", "varchar(25)", false)
                .column("AminoAcid", "enum('Ala','Gly','Ser')", false),
        )
        .table(
            TableMeta::new("domain")
                .column("HitID", "varchar(25)", true)
                .column("Description", "blob", false),
        )
        .table(
            TableMeta::new("gene_domain")
                .column("ID", "int(10) unsigned", true)
                .column("GeneID", "varchar(35)", false)
                .column("HitID", "varchar(25)", false)
                .column("Expect", "double", false),
        )
        .table(
            TableMeta::new("version")
                .column("Version", "int(11)", true)
                .column("SchemaVersion", "int(11)", false),
        )
        .foreign_key("gene", "PhageID", "phage", "PhageID")
        .foreign_key("trna", "PhageID", "phage", "PhageID")
        .foreign_key("gene_domain", "GeneID", "gene", "GeneID")
        .foreign_key("gene_domain", "HitID", "domain", "HitID")
}

pub(crate) fn phamerator_graph() -> Arc<SchemaGraph> {
    Arc::new(SchemaGraph::build(phamerator_schema()).expect("fixture schema is consistent"))
}
