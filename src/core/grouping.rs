use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

use crate::core::batch::Executor;
use crate::core::error::Result;
use crate::core::filter::FilterState;
use crate::models::predicate::{Operator, Predicate};
use crate::models::schema::ColumnRef;
use crate::models::value::{Row, Value};

/// 分组树的一个叶子：每层分组列取到的值，以及追加了对应等值条件的过滤状态
#[derive(Debug, Clone)]
pub struct GroupBranch {
    pub key: Vec<Value>,
    pub filter: FilterState,
}

impl GroupBranch {
    /// 该分支累积的全部条件
    pub fn predicate(&self) -> Option<Predicate> {
        self.filter.where_clause()
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 按 groups 依次细分 filter。每一层对当前分支做 DISTINCT 探测，
/// 每个取值派生一个独立副本并追加 列 = 值；某层没有取值时该分支不产生叶子
pub async fn build_groups_map<E: Executor>(
    exec: &E,
    filter: &FilterState,
    groups: &[&str],
) -> Result<Vec<GroupBranch>> {
    // 先整体解析分组列，未知列在任何查询之前报错
    let columns = groups
        .iter()
        .map(|g| filter.get_column(g))
        .collect::<Result<Vec<_>>>()?;

    let branches = split(exec, filter.copy(), Vec::new(), &columns, 0).await?;
    info!("分组完成: {} 层, {} 个分支", columns.len(), branches.len());
    Ok(branches)
}

fn split<'a, E: Executor + 'a>(
    exec: &'a E,
    filter: FilterState,
    key: Vec<Value>,
    columns: &'a [ColumnRef],
    depth: usize,
) -> BoxFuture<'a, Result<Vec<GroupBranch>>> {
    Box::pin(async move {
        let Some((column, rest)) = columns.split_first() else {
            return Ok(vec![GroupBranch { key, filter }]);
        };

        let mut values = filter.build_values(exec, Some(column), None).await?;
        values.sort_by(|a, b| a.sort_cmp(b));
        debug!("{}按 {} 分组: {} 个取值", "..".repeat(depth), column, values.len());

        let mut branches = Vec::new();
        for value in values {
            let mut branch = filter.copy();
            branch.add_predicate(Predicate::leaf(column.clone(), Operator::Eq, value.clone()));
            let mut branch_key = key.clone();
            branch_key.push(value);
            branches.extend(split(exec, branch, branch_key, rest, depth + 1).await?);
        }
        Ok(branches)
    })
}

/// 对每个分支刷新候选键值、按 sort 排序并取出所需列；命中为 0 的分支跳过
pub async fn export_groups<E: Executor>(
    exec: &E,
    filter: &FilterState,
    groups: &[&str],
    columns: &[ColumnRef],
    sort: &[ColumnRef],
) -> Result<Vec<(Vec<Value>, Vec<Row>)>> {
    let branches = build_groups_map(exec, filter, groups).await?;
    let mut exported = Vec::with_capacity(branches.len());
    for GroupBranch { key, mut filter } in branches {
        filter.update(exec).await?;
        if filter.hits() == 0 {
            warn!("分组 {:?} 没有命中任何 {}, 跳过", key, filter.key());
            continue;
        }
        // update 重建了键值，排序必须在其后
        filter.sort(exec, sort).await?;
        let rows = filter.select(exec, columns).await?;
        exported.push((key, rows));
    }
    Ok(exported)
}
