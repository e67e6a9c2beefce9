//! CSV loading for historical match results

use polars::prelude::*;
use std::path::Path;

use crate::error::EngineError;
use crate::models::{parse_date, RawMatchRow, ServeCounters};

/// Load every row of a match CSV, stably sorted by date
///
/// Optional statistic columns may be absent. Without a `Winner` column the
/// file follows the winner/loser layout and `Player_1` is the winner.
pub fn load_match_rows<P: AsRef<Path>>(csv_path: P) -> Result<Vec<RawMatchRow>, EngineError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(csv_path.as_ref().to_path_buf()))?
        .finish()?;

    let mut rows = rows_from_dataframe(&df)?;
    rows.sort_by_key(|row| row.date.as_deref().and_then(|d| parse_date(d).ok()));
    Ok(rows)
}

/// Convert a loaded match DataFrame into unvalidated rows
pub fn rows_from_dataframe(df: &DataFrame) -> Result<Vec<RawMatchRow>, PolarsError> {
    let dates = string_column(df, "Date")?;
    let surfaces = string_column(df, "Surface")?;
    let best_of = count_column(df, "Best of")?;
    let players_1 = string_column(df, "Player_1")?;
    let players_2 = string_column(df, "Player_2")?;
    let winners = string_column(df, "Winner")?;
    let scores = string_column(df, "Score")?;
    let odds_1 = float_column(df, "Odd_1")?;
    let odds_2 = float_column(df, "Odd_2")?;
    let serve_1 = ServeColumns::load(df, "P1")?;
    let serve_2 = ServeColumns::load(df, "P2")?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let player_a = cell(&players_1, i);
        let winner = match &winners {
            Some(_) => cell(&winners, i),
            None => player_a.clone(),
        };

        rows.push(RawMatchRow {
            date: cell(&dates, i),
            surface: cell(&surfaces, i),
            best_of: cell(&best_of, i),
            player_a,
            player_b: cell(&players_2, i),
            winner,
            serve_a: serve_1.counters(i),
            serve_b: serve_2.counters(i),
            score: cell(&scores, i),
            odds_a: cell(&odds_1, i),
            odds_b: cell(&odds_2, i),
        });
    }

    Ok(rows)
}

type Column<T> = Option<Vec<Option<T>>>;

fn cell<T: Clone>(column: &Column<T>, i: usize) -> Option<T> {
    column.as_ref().and_then(|values| values.get(i).cloned().flatten())
}

/// String values of an optional column
fn string_column(df: &DataFrame, name: &str) -> Result<Column<String>, PolarsError> {
    let Ok(series) = df.column(name) else {
        return Ok(None);
    };
    let series = series.cast(&DataType::String)?;
    let values: Vec<_> = series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .collect();
    Ok(Some(values))
}

/// Float values of an optional column; non-finite values count as missing
fn float_column(df: &DataFrame, name: &str) -> Result<Column<f64>, PolarsError> {
    let Ok(series) = df.column(name) else {
        return Ok(None);
    };
    let series = series.cast(&DataType::Float64)?;
    let values: Vec<_> = series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    Ok(Some(values))
}

/// Non-negative integer counts; negative or fractional values count as missing
fn count_column(df: &DataFrame, name: &str) -> Result<Column<u32>, PolarsError> {
    Ok(float_column(df, name)?.map(|values| {
        values
            .into_iter()
            .map(|v| v.filter(|x| *x >= 0.0 && x.fract() == 0.0).map(|x| x as u32))
            .collect()
    }))
}

/// Serve counter columns of one player (`P1_*` or `P2_*`)
struct ServeColumns {
    aces: Column<u32>,
    double_faults: Column<u32>,
    serve_points: Column<u32>,
    first_in: Column<u32>,
    first_won: Column<u32>,
    second_won: Column<u32>,
    serve_games: Column<u32>,
    bp_saved: Column<u32>,
    bp_faced: Column<u32>,
}

impl ServeColumns {
    fn load(df: &DataFrame, prefix: &str) -> Result<Self, PolarsError> {
        let col = |stat: &str| count_column(df, &format!("{}_{}", prefix, stat));
        Ok(Self {
            aces: col("Ace")?,
            double_faults: col("DF")?,
            serve_points: col("SvPt")?,
            first_in: col("1stIn")?,
            first_won: col("1stWon")?,
            second_won: col("2ndWon")?,
            serve_games: col("SvGms")?,
            bp_saved: col("BpSaved")?,
            bp_faced: col("BpFaced")?,
        })
    }

    fn counters(&self, i: usize) -> ServeCounters {
        ServeCounters {
            aces: cell(&self.aces, i),
            double_faults: cell(&self.double_faults, i),
            serve_points: cell(&self.serve_points, i),
            first_in: cell(&self.first_in, i),
            first_won: cell(&self.first_won, i),
            second_won: cell(&self.second_won, i),
            serve_games: cell(&self.serve_games, i),
            bp_saved: cell(&self.bp_saved, i),
            bp_faced: cell(&self.bp_faced, i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_full_columns_sorted() {
        let file = write_csv(
            "Date,Surface,Best of,Player_1,Player_2,Winner,Score,P1_Ace,P1_SvPt,P1_1stIn,P1_1stWon,P1_2ndWon,P2_Ace,P2_SvPt,Odd_1,Odd_2\n\
             2024-01-20,Hard,5,Sinner J.,Medvedev D.,Sinner J.,3-6 3-6 6-4 6-4 6-3,12,150,95,70,30,9,160,1.45,2.8\n\
             2024-01-10,Clay,3,Alcaraz C.,Ruud C.,Ruud C.,6-4 6-4,5,70,45,33,12,,65,1.3,3.5\n",
        );
        let rows = load_match_rows(file.path()).unwrap();
        assert_eq!(rows.len(), 2);

        // Sorted by date
        assert_eq!(rows[0].player_a.as_deref(), Some("Alcaraz C."));
        assert_eq!(rows[0].winner.as_deref(), Some("Ruud C."));
        assert_eq!(rows[0].serve_b.aces, None);
        assert_eq!(rows[1].best_of, Some(5));
        assert_eq!(rows[1].serve_a.aces, Some(12));
        assert_eq!(rows[1].serve_a.first_won, Some(70));
        assert_eq!(rows[1].serve_a.bp_faced, None);
        assert_eq!(rows[1].odds_b, Some(2.8));
    }

    #[test]
    fn test_missing_winner_column_means_player_1() {
        let file = write_csv(
            "Date,Surface,Player_1,Player_2\n\
             20240105,Grass,Winner W.,Loser L.\n",
        );
        let rows = load_match_rows(file.path()).unwrap();
        assert_eq!(rows[0].winner.as_deref(), Some("Winner W."));
        assert_eq!(rows[0].best_of, None);
        assert!(rows[0].score.is_none());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_match_rows("/nonexistent/matches.csv").is_err());
    }
}
