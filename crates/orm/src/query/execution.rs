//! Running built queries against an [`Executor`]

use serde_json::Value;

use super::types::{QueryComponents, UpdateValue};
use super::{Hydrate, Paginator, QueryBuilder};
use crate::connection::{value_as_f64, value_as_i64, Executor, Row};
use crate::error::{ModelError, ModelResult};

const DEFAULT_PER_PAGE: u64 = 15;

fn last_segment(column: &str) -> &str {
    let column = match column.to_ascii_lowercase().find(" as ") {
        Some(pos) => &column[pos + 4..],
        None => column,
    };
    column.rsplit('.').next().unwrap_or(column).trim()
}

impl<M> QueryBuilder<M> {
    fn compile_aggregate<E: Executor + ?Sized>(
        &self,
        db: &E,
        function: &str,
        column: &str,
    ) -> ModelResult<(String, Vec<Value>)> {
        self.check()?;
        let grammar = db.grammar();
        let expression = grammar.compile_aggregate(function, column);

        if self.components.distinct || !self.components.groups.is_empty() {
            let (inner, params) = grammar.compile_select(&self.components)?;
            let outer = grammar.compile_aggregate(function, if column == "*" { "*" } else { last_segment(column) });
            return Ok((format!("SELECT {} FROM ({}) AS aggregate_table", outer, inner), params));
        }

        let components = QueryComponents {
            columns: vec![expression],
            orders: Vec::new(),
            limit: None,
            offset: None,
            ..self.components.clone()
        };
        grammar.compile_select(&components)
    }

    async fn aggregate<E: Executor + ?Sized>(
        &self,
        db: &E,
        function: &str,
        column: &str,
    ) -> ModelResult<Value> {
        let (sql, params) = self.compile_aggregate(db, function, column)?;
        let row = db.fetch_optional(&sql, &params).await?;
        Ok(row
            .and_then(|mut row| row.remove("aggregate"))
            .unwrap_or(Value::Null))
    }

    pub async fn count<E: Executor + ?Sized>(&self, db: &E) -> ModelResult<u64> {
        let value = self.aggregate(db, "count", "*").await?;
        Ok(value_as_i64(&value).unwrap_or(0).max(0) as u64)
    }

    pub async fn exists<E: Executor + ?Sized>(&self, db: &E) -> ModelResult<bool> {
        Ok(self.count(db).await? > 0)
    }

    pub async fn doesnt_exist<E: Executor + ?Sized>(&self, db: &E) -> ModelResult<bool> {
        Ok(!self.exists(db).await?)
    }

    /// `None` when no rows matched
    pub async fn sum<E: Executor + ?Sized>(&self, db: &E, column: &str) -> ModelResult<Option<f64>> {
        Ok(value_as_f64(&self.aggregate(db, "sum", column).await?))
    }

    pub async fn avg<E: Executor + ?Sized>(&self, db: &E, column: &str) -> ModelResult<Option<f64>> {
        Ok(value_as_f64(&self.aggregate(db, "avg", column).await?))
    }

    pub async fn min<E: Executor + ?Sized>(&self, db: &E, column: &str) -> ModelResult<Option<Value>> {
        let value = self.aggregate(db, "min", column).await?;
        Ok((!value.is_null()).then_some(value))
    }

    pub async fn max<E: Executor + ?Sized>(&self, db: &E, column: &str) -> ModelResult<Option<Value>> {
        let value = self.aggregate(db, "max", column).await?;
        Ok((!value.is_null()).then_some(value))
    }

    /// First value of one column
    pub async fn value<E: Executor + ?Sized>(&self, db: &E, column: &str) -> ModelResult<Option<Value>> {
        let (sql, params) = self.clone().select(&[column]).limit(1).to_sql()?;
        let row = db.fetch_optional(&sql, &params).await?;
        Ok(row.and_then(|mut row| row.remove(last_segment(column))))
    }

    pub async fn pluck<E: Executor + ?Sized>(&self, db: &E, column: &str) -> ModelResult<Vec<Value>> {
        let (sql, params) = self.clone().select(&[column]).to_sql()?;
        let key = last_segment(column);
        Ok(db
            .fetch_all(&sql, &params)
            .await?
            .into_iter()
            .map(|mut row| row.remove(key).unwrap_or(Value::Null))
            .collect())
    }

    fn insert_parts(&self, rows: &[Row]) -> ModelResult<(Vec<String>, Vec<Vec<Value>>)> {
        self.check()?;
        let first = rows
            .first()
            .ok_or_else(|| ModelError::Query(format!("nothing to insert into '{}'", self.table_name())))?;
        let columns: Vec<String> = first.keys().cloned().collect();
        let values = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Ok((columns, values))
    }

    pub async fn insert<E: Executor + ?Sized>(&self, db: &E, row: Row) -> ModelResult<u64> {
        self.insert_many(db, vec![row]).await
    }

    /// Columns come from the first row. Values missing from later rows insert as NULL.
    pub async fn insert_many<E: Executor + ?Sized>(&self, db: &E, rows: Vec<Row>) -> ModelResult<u64> {
        let (columns, values) = self.insert_parts(&rows)?;
        let (sql, params) = db
            .grammar()
            .compile_insert(self.table_name(), &columns, &values)?;
        db.execute(&sql, &params).await
    }

    pub async fn insert_get_id<E: Executor + ?Sized>(&self, db: &E, row: Row) -> ModelResult<i64> {
        self.insert_get_id_as(db, row, "id").await
    }

    pub(crate) async fn insert_get_id_as<E: Executor + ?Sized>(
        &self,
        db: &E,
        row: Row,
        key: &str,
    ) -> ModelResult<i64> {
        let (columns, mut values) = self.insert_parts(&[row])?;
        let values = values.pop().unwrap_or_default();
        let (sql, params) = db
            .grammar()
            .compile_insert_get_id(self.table_name(), &columns, &values, key)?;
        db.insert_get_id(&sql, &params).await
    }

    pub async fn update<E: Executor + ?Sized>(&self, db: &E, values: Row) -> ModelResult<u64> {
        let values: Vec<(String, UpdateValue)> = values
            .into_iter()
            .map(|(column, value)| (column, UpdateValue::Value(value)))
            .collect();
        self.update_with(db, &values).await
    }

    async fn update_with<E: Executor + ?Sized>(
        &self,
        db: &E,
        values: &[(String, UpdateValue)],
    ) -> ModelResult<u64> {
        self.check()?;
        let (sql, params) = db.grammar().compile_update(&self.components, values)?;
        db.execute(&sql, &params).await
    }

    pub async fn increment<E: Executor + ?Sized>(&self, db: &E, column: &str, by: i64) -> ModelResult<u64> {
        self.update_with(db, &[(column.to_string(), UpdateValue::Increment(Value::from(by)))])
            .await
    }

    pub async fn decrement<E: Executor + ?Sized>(&self, db: &E, column: &str, by: i64) -> ModelResult<u64> {
        self.increment(db, column, -by).await
    }

    pub async fn delete<E: Executor + ?Sized>(&self, db: &E) -> ModelResult<u64> {
        self.check()?;
        let (sql, params) = db.grammar().compile_delete(&self.components)?;
        db.execute(&sql, &params).await
    }

    pub async fn truncate<E: Executor + ?Sized>(&self, db: &E) -> ModelResult<()> {
        self.check()?;
        for statement in db.grammar().compile_truncate(self.table_name()) {
            db.execute(&statement, &[]).await?;
        }
        Ok(())
    }
}

impl<M: Hydrate> QueryBuilder<M> {
    pub async fn get<E: Executor + ?Sized>(&self, db: &E) -> ModelResult<Vec<M::Output>> {
        self.check()?;
        let (sql, params) = db.grammar().compile_select(&self.components)?;
        db.fetch_all(&sql, &params)
            .await?
            .into_iter()
            .map(M::hydrate)
            .collect()
    }

    pub async fn first<E: Executor + ?Sized>(&self, db: &E) -> ModelResult<Option<M::Output>> {
        let mut rows = self.clone().limit(1).get(db).await?;
        Ok(rows.pop())
    }

    pub async fn first_or_fail<E: Executor + ?Sized>(&self, db: &E) -> ModelResult<M::Output> {
        self.first(db)
            .await?
            .ok_or_else(|| ModelError::NotFound(self.table_name().to_string()))
    }

    pub async fn find<E: Executor + ?Sized>(
        &self,
        db: &E,
        id: impl Into<Value> + Send,
    ) -> ModelResult<Option<M::Output>> {
        self.clone().where_eq("id", id).first(db).await
    }

    pub async fn paginate<E: Executor + ?Sized>(
        &self,
        db: &E,
        page: u64,
        per_page: Option<u64>,
    ) -> ModelResult<Paginator<M::Output>> {
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
        let page = page.max(1);
        let total = self.count(db).await?;
        let data = self.clone().for_page(page, per_page).get(db).await?;
        Ok(Paginator::new(data, total, per_page, page))
    }

    /// Walks the results `size` rows at a time. Returning `false` stops early.
    pub async fn chunk<E, F>(&self, db: &E, size: u64, mut f: F) -> ModelResult<()>
    where
        E: Executor + ?Sized,
        F: FnMut(Vec<M::Output>) -> bool + Send,
    {
        if size == 0 {
            return Err(ModelError::Query("chunk size must be positive".to_string()));
        }

        let mut page = 1;
        loop {
            let results = self.clone().for_page(page, size).get(db).await?;
            let fetched = results.len() as u64;
            if fetched == 0 || !f(results) || fetched < size {
                return Ok(());
            }
            page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    async fn seeded() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.execute(
            "CREATE TABLE products (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, category TEXT, price REAL, stock INTEGER)",
            &[],
        )
        .await
        .unwrap();

        let products = db.table("products");
        products
            .insert_many(
                &db,
                vec![
                    row(json!({"name": "Lamp", "category": "home", "price": 20.0, "stock": 3})),
                    row(json!({"name": "Desk", "category": "home", "price": 150.0, "stock": 1})),
                    row(json!({"name": "Pen", "category": "office", "price": 2.5, "stock": 40})),
                    row(json!({"name": "Mystery", "price": 1.0})),
                ],
            )
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_get_first_find() {
        let db = seeded().await;

        let home = db.table("products").where_eq("category", "home").order_by("name", "asc").get(&db).await.unwrap();
        assert_eq!(home.len(), 2);
        assert_eq!(home[0]["name"], json!("Desk"));

        let first = db.table("products").first(&db).await.unwrap().unwrap();
        assert_eq!(first["id"], json!(1));

        let found = db.table("products").find(&db, 3).await.unwrap().unwrap();
        assert_eq!(found["name"], json!("Pen"));
        assert!(db.table("products").find(&db, 99).await.unwrap().is_none());

        let missing = db.table("products").where_eq("name", "Chair").first_or_fail(&db).await;
        assert!(matches!(missing, Err(ModelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_values_insert_as_null() {
        let db = seeded().await;
        let mystery = db.table("products").where_null("category").get(&db).await.unwrap();
        assert_eq!(mystery.len(), 1);
        assert_eq!(mystery[0]["stock"], Value::Null);
    }

    #[tokio::test]
    async fn test_aggregates() {
        let db = seeded().await;
        let products = db.table("products");

        assert_eq!(products.count(&db).await.unwrap(), 4);
        assert_eq!(products.clone().where_eq("category", "home").sum(&db, "stock").await.unwrap(), Some(4.0));
        assert_eq!(products.max(&db, "price").await.unwrap(), Some(json!(150.0)));
        assert_eq!(products.min(&db, "stock").await.unwrap(), Some(json!(1)));
        assert!(products.clone().where_eq("category", "garden").sum(&db, "price").await.unwrap().is_none());
        assert!(products.clone().where_eq("category", "garden").doesnt_exist(&db).await.unwrap());

        let grouped = products.clone().select(&["category"]).where_not_null("category").group_by(&["category"]);
        assert_eq!(grouped.count(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_value_and_pluck() {
        let db = seeded().await;
        let names = db.table("products").order_by("id", "asc").pluck(&db, "name").await.unwrap();
        assert_eq!(names, vec![json!("Lamp"), json!("Desk"), json!("Pen"), json!("Mystery")]);

        let price = db.table("products").where_eq("name", "Pen").value(&db, "products.price").await.unwrap();
        assert_eq!(price, Some(json!(2.5)));
    }

    #[tokio::test]
    async fn test_paginate_and_chunk() {
        let db = seeded().await;
        let page = db.table("products").order_by("id", "asc").paginate(&db, 2, Some(3)).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.last_page, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.from, Some(4));

        let mut seen = Vec::new();
        db.table("products")
            .order_by("id", "asc")
            .chunk(&db, 3, |rows| {
                seen.push(rows.len());
                true
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![3, 1]);

        let mut calls = 0;
        db.table("products")
            .chunk(&db, 1, |_| {
                calls += 1;
                false
            })
            .await
            .unwrap();
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_update_increment_delete() {
        let db = seeded().await;
        let pens = db.table("products").where_eq("name", "Pen");

        let affected = pens.update(&db, row(json!({"price": 3.0, "category": null}))).await.unwrap();
        assert_eq!(affected, 1);
        assert_eq!(pens.value(&db, "category").await.unwrap(), Some(Value::Null));

        pens.increment(&db, "stock", 10).await.unwrap();
        pens.decrement(&db, "stock", 5).await.unwrap();
        assert_eq!(pens.value(&db, "stock").await.unwrap(), Some(json!(45)));

        let deleted = db.table("products").where_("price", ">", 100).delete(&db).await.unwrap();
        assert_eq!(deleted, 1);

        db.table("products").truncate(&db).await.unwrap();
        assert_eq!(db.table("products").count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_get_id_and_transactions() {
        let db = seeded().await;
        let id = db
            .table("products")
            .insert_get_id(&db, row(json!({"name": "Chair", "price": 80.0})))
            .await
            .unwrap();
        assert_eq!(id, 5);

        let tx = db.begin().await.unwrap();
        tx.table("products").where_eq("id", id).delete(&tx).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(db.table("products").find(&db, id).await.unwrap().is_some());
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("users.name"), "name");
        assert_eq!(last_segment("users.name as author"), "author");
        assert_eq!(last_segment("id"), "id");
        assert_eq!(last_segment("SUM(price) AS total"), "total");
        assert_eq!(last_segment("İİ.name as x"), "x");
    }
}
