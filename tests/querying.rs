mod common;

use common::{phamerator, texts};
use genome_query::core::batch::{self, execute_value_subqueries};
use genome_query::core::builder::{QueryBuilder, Statement};
use genome_query::core::error::QueryError;
use genome_query::core::expression::compile;
use genome_query::core::filter::FilterState;
use genome_query::core::grouping::{build_groups_map, export_groups};
use genome_query::models::query::Selection;
use genome_query::models::value::Value;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn reflected_graph_links_genes_and_trnas_to_phages() {
    let fx = phamerator().await;
    let mut tables: Vec<&str> = fx.graph.tables().map(|t| t.name()).collect();
    tables.sort();
    assert_eq!(tables, vec!["gene", "phage", "trna", "version"]);
    assert_eq!(fx.graph.relationships().count(), 2);

    let rel = fx.graph.relationship("gene", "phage").unwrap();
    assert_eq!((rel.pk_table.as_str(), rel.pk_column.as_str()), ("phage", "PhageID"));
    assert_eq!((rel.fk_table.as_str(), rel.fk_column.as_str()), ("gene", "PhageID"));
}

#[tokio::test]
async fn cluster_filter_selects_genes_of_cluster_phages() {
    let fx = phamerator().await;
    let mut filter = FilterState::new(fx.graph.clone(), "gene").unwrap();
    filter.add("phage.Cluster=A").unwrap();
    filter.update(&fx.pool).await.unwrap();

    let mut genes = texts(filter.values());
    genes.sort();
    assert_eq!(genes, vec!["D29_CDS_1", "L5_CDS_1", "Trixie_CDS_1", "Trixie_CDS_2"]);
    assert_eq!(filter.hits(), 4);
}

#[tokio::test]
async fn select_keeps_duplicates_and_distinct_removes_them() {
    let fx = phamerator().await;
    let builder = QueryBuilder::new(&fx.graph);
    let cluster = fx.graph.get_column("phage.Cluster").unwrap();
    let where_ = compile(&fx.graph, "gene.PhamID=10").unwrap();

    let select = builder.build_select(&[cluster.clone().into()], Some(&where_), &[]).unwrap();
    let rows = batch::execute(&fx.pool, &select).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["Cluster"] == Value::from("A")));

    let distinct = builder.build_distinct(&[cluster.into()], Some(&where_)).unwrap();
    let values = batch::first_column(&fx.pool, &distinct).await.unwrap();
    assert_eq!(values, vec![Value::from("A")]);
}

#[tokio::test]
async fn one_parent_with_many_children_repeats_in_select_only() {
    let fx = phamerator().await;
    let builder = QueryBuilder::new(&fx.graph);
    let phage_id = fx.graph.get_column("phage.PhageID").unwrap();
    let gene_id = fx.graph.get_column("gene.GeneID").unwrap();
    let where_ = compile(&fx.graph, "phage.PhageID=Trixie").unwrap();

    let select = builder
        .build_select(&[phage_id.clone().into(), gene_id.into()], Some(&where_), &[])
        .unwrap();
    let rows = batch::execute(&fx.pool, &select).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["PhageID"] == Value::from("Trixie")));

    let distinct = builder.build_distinct(&[phage_id.into()], Some(&where_)).unwrap();
    let values = batch::first_column(&fx.pool, &distinct).await.unwrap();
    assert_eq!(values, vec![Value::from("Trixie")]);
}

#[tokio::test]
async fn count_query_names_columns_in_order() {
    let fx = phamerator().await;
    let gene_id = fx.graph.get_column("gene.GeneID").unwrap();
    let cluster = fx.graph.get_column("phage.Cluster").unwrap();
    let where_ = compile(&fx.graph, "gene.PhamID<=30").unwrap();

    let query = QueryBuilder::new(&fx.graph)
        .build_count(&[gene_id.into(), cluster.distinct()], Some(&where_))
        .unwrap();
    let rows = batch::execute(&fx.pool, &query).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].columns(), &["count_1".to_string(), "count_2".to_string()]);
    assert_eq!(rows[0]["count_1"], Value::Int(5));
    assert_eq!(rows[0]["count_2"], Value::Int(3));
}

#[tokio::test]
async fn order_by_sorts_ascending() {
    let fx = phamerator().await;
    let phage_id = fx.graph.get_column("phage.PhageID").unwrap();
    let query = QueryBuilder::new(&fx.graph)
        .build_select(&[phage_id.clone().into()], None, &[phage_id])
        .unwrap();
    let values = batch::first_column(&fx.pool, &query).await.unwrap();
    assert_eq!(texts(&values), vec!["Alice", "D29", "L5", "Myrna", "Trixie"]);
}

#[tokio::test]
async fn null_literal_matches_missing_subcluster() {
    let fx = phamerator().await;
    let phage_id = fx.graph.get_column("phage.PhageID").unwrap();
    let where_ = compile(&fx.graph, "phage.Subcluster=NULL").unwrap();
    let query = QueryBuilder::new(&fx.graph).build_select(&[phage_id.into()], Some(&where_), &[]).unwrap();
    let values = batch::first_column(&fx.pool, &query).await.unwrap();
    assert_eq!(values, vec![Value::from("Myrna")]);
}

#[tokio::test]
async fn chunked_execution_matches_single_query() {
    let fx = phamerator().await;
    let phage_id = fx.graph.get_column("phage.PhageID").unwrap();
    let gene_id = fx.graph.get_column("gene.GeneID").unwrap();
    let query = QueryBuilder::new(&fx.graph)
        .build_select(&[gene_id.into(), phage_id.clone().into()], None, &[])
        .unwrap();
    let values: Vec<Value> = ["Trixie", "D29", "L5", "Alice", "Myrna"].into_iter().map(Value::from).collect();

    let chunked = execute_value_subqueries(&fx.pool, &fx.graph, &query, &phage_id, &values, 2).await.unwrap();
    let single = execute_value_subqueries(&fx.pool, &fx.graph, &query, &phage_id, &values, 100).await.unwrap();

    let mut chunked: Vec<String> = chunked.iter().map(|r| r["GeneID"].to_string()).collect();
    let mut single: Vec<String> = single.iter().map(|r| r["GeneID"].to_string()).collect();
    chunked.sort();
    single.sort();
    assert_eq!(chunked.len(), 6);
    assert_eq!(chunked, single);
}

#[tokio::test]
async fn sort_orders_keys_by_requested_columns() {
    let fx = phamerator().await;
    let mut filter = FilterState::new(fx.graph.clone(), "phage").unwrap().with_chunk_limit(2);
    filter.update(&fx.pool).await.unwrap();

    let columns = vec![
        fx.graph.get_column("phage.Cluster").unwrap(),
        fx.graph.get_column("phage.PhageID").unwrap(),
    ];
    filter.sort(&fx.pool, &columns).await.unwrap();
    assert_eq!(texts(filter.values()), vec!["D29", "L5", "Trixie", "Alice", "Myrna"]);
}

#[tokio::test]
async fn grouping_splits_by_each_distinct_value() {
    let fx = phamerator().await;
    let mut filter = FilterState::new(fx.graph.clone(), "phage").unwrap();
    filter.update(&fx.pool).await.unwrap();

    let branches = build_groups_map(&fx.pool, &filter, &["phage.Cluster"]).await.unwrap();
    let keys: Vec<Vec<String>> = branches.iter().map(|b| texts(&b.key)).collect();
    assert_eq!(keys, vec![vec!["A"], vec!["B"], vec!["Singleton"]]);

    let branches = build_groups_map(&fx.pool, &filter, &["phage.Cluster", "phage.Subcluster"])
        .await
        .unwrap();
    let keys: Vec<Vec<Value>> = branches.iter().map(|b| b.key.clone()).collect();
    assert_eq!(
        keys,
        vec![
            vec![Value::from("A"), Value::from("A1")],
            vec![Value::from("A"), Value::from("A2")],
            vec![Value::from("B"), Value::from("B1")],
            vec![Value::from("Singleton"), Value::Null],
        ]
    );
}

#[tokio::test]
async fn export_returns_rows_per_branch() {
    let fx = phamerator().await;
    let mut filter = FilterState::new(fx.graph.clone(), "gene").unwrap();
    filter.add("gene.PhamID<=20").unwrap();
    filter.update(&fx.pool).await.unwrap();

    let columns = vec![fx.graph.get_column("gene.PhamID").unwrap()];
    let exported = export_groups(&fx.pool, &filter, &["phage.Cluster", "phage.Subcluster"], &columns, &[])
        .await
        .unwrap();

    let summary: Vec<(Vec<String>, Vec<String>)> = exported
        .iter()
        .map(|(key, rows)| {
            let mut genes: Vec<String> = rows.iter().map(|r| r["GeneID"].to_string()).collect();
            genes.sort();
            (texts(key), genes)
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (
                vec!["A".to_string(), "A2".to_string()],
                vec!["D29_CDS_1".to_string(), "Trixie_CDS_1".to_string(), "Trixie_CDS_2".to_string()]
            ),
            (vec!["B".to_string(), "B1".to_string()], vec!["Alice_CDS_1".to_string()]),
        ]
    );
}

#[tokio::test]
async fn export_orders_rows_by_sort_columns_within_each_branch() {
    let fx = phamerator().await;
    let mut filter = FilterState::new(fx.graph.clone(), "gene").unwrap();
    filter.update(&fx.pool).await.unwrap();

    let columns = vec![fx.graph.get_column("gene.PhamID").unwrap()];
    let sort = vec![
        fx.graph.get_column("gene.PhamID").unwrap(),
        fx.graph.get_column("gene.GeneID").unwrap(),
    ];
    let genes = |exported: Vec<(Vec<Value>, Vec<genome_query::models::value::Row>)>| -> Vec<Vec<String>> {
        exported
            .iter()
            .map(|(_, rows)| rows.iter().map(|r| r["GeneID"].to_string()).collect())
            .collect()
    };

    let sorted = export_groups(&fx.pool, &filter, &[], &columns, &sort).await.unwrap();
    assert_eq!(
        genes(sorted),
        vec![vec!["D29_CDS_1", "Trixie_CDS_1", "Alice_CDS_1", "Trixie_CDS_2", "Myrna_CDS_1", "L5_CDS_1"]]
    );

    let grouped = export_groups(&fx.pool, &filter, &["phage.Cluster"], &columns, &sort).await.unwrap();
    assert_eq!(
        genes(grouped),
        vec![
            vec!["D29_CDS_1", "Trixie_CDS_1", "Trixie_CDS_2", "L5_CDS_1"],
            vec!["Alice_CDS_1"],
            vec!["Myrna_CDS_1"],
        ]
    );
}

#[tokio::test]
async fn failed_transaction_leaves_no_partial_writes() {
    let fx = phamerator().await;
    let statements = vec![
        Statement::new("INSERT INTO phage (PhageID, Cluster) VALUES (?, ?)")
            .bind("Bxb1")
            .bind("A"),
        // 主键冲突
        Statement::new("INSERT INTO phage (PhageID, Cluster) VALUES (?, ?)")
            .bind("Trixie")
            .bind("A"),
    ];
    let err = fx.pool.execute_transaction(&statements).await.unwrap_err();
    assert!(matches!(err, QueryError::Engine(_)));

    let phage_id = fx.graph.get_column("phage.PhageID").unwrap();
    let count = QueryBuilder::new(&fx.graph).build_count(&[phage_id.into()], None).unwrap();
    let rows = batch::execute(&fx.pool, &count).await.unwrap();
    assert_eq!(rows[0]["count_1"], Value::Int(5));
}

#[tokio::test]
async fn disconnected_table_is_unreachable() {
    let fx = phamerator().await;
    let columns: [Selection; 2] = [
        fx.graph.get_column("phage.PhageID").unwrap().into(),
        fx.graph.get_column("version.Version").unwrap().into(),
    ];
    let err = QueryBuilder::new(&fx.graph).build_select(&columns, None, &[]).unwrap_err();
    assert!(matches!(err, QueryError::Unreachable { .. }));
    assert!(err.is_input_error());
}
