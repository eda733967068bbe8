//! Food recommendation queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{format_timestamp, parse_timestamp, Storage};
use crate::error::Result;
use crate::food::{FoodRecommendation, NewFood};

impl Storage {
    /// Add a food recommendation and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_food(&self, food: &NewFood, now: DateTime<Utc>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO food_recommendations (name, description, calories, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![food.name, food.description, food.calories, format_timestamp(now)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All food recommendations, by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_foods(&self) -> Result<Vec<FoodRecommendation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, calories, created_at \
             FROM food_recommendations ORDER BY name COLLATE NOCASE, id",
        )?;
        let foods = stmt
            .query_map([], row_to_food)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(foods)
    }
}

pub(super) fn insert_full(conn: &Connection, food: &FoodRecommendation) -> Result<()> {
    conn.execute(
        "INSERT INTO food_recommendations (id, name, description, calories, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            food.id,
            food.name,
            food.description,
            food.calories,
            format_timestamp(food.created_at)
        ],
    )?;
    Ok(())
}

fn row_to_food(row: &Row) -> rusqlite::Result<FoodRecommendation> {
    let created_at: String = row.get(4)?;
    Ok(FoodRecommendation {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        calories: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_list_sorted() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Utc::now();
        for (name, calories) in [("spinach", Some(23)), ("Almonds", None)] {
            storage
                .insert_food(
                    &NewFood {
                        name: name.to_string(),
                        description: String::new(),
                        calories,
                    },
                    now,
                )
                .unwrap();
        }

        let foods = storage.list_foods().unwrap();
        assert_eq!(foods.len(), 2);
        assert_eq!(foods[0].name, "Almonds");
        assert_eq!(foods[0].calories, None);
        assert_eq!(foods[1].calories, Some(23));
    }
}
