use crate::define_index_newtype;

define_index_newtype!(RowIdx, Row);
define_index_newtype!(ColIdx, Column);

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub cost: f64,
    pub lower: f64,
    pub upper: f64,
    /// Only honoured by integral solves.
    pub integer: bool,
    pub coefficients: Vec<(RowIdx, f64)>,
}

/// A minimisation problem stored column-wise, so columns can be appended to
/// existing rows between solves.
#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    rows: Vec<Row>,
    columns: Vec<Column>,
}

impl LinearProgram {
    pub fn add_row(&mut self, lower: f64, upper: f64) -> RowIdx {
        self.rows.push(Row { lower, upper });
        RowIdx::new(self.rows.len() - 1)
    }

    pub fn add_column(&mut self, column: Column) -> ColIdx {
        debug_assert!(
            column
                .coefficients
                .iter()
                .all(|(row, _)| row.get() < self.rows.len()),
            "column references an unknown row"
        );
        self.columns.push(column);
        ColIdx::new(self.columns.len() - 1)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: RowIdx) -> &Row {
        &self.rows[index]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: ColIdx) -> &Column {
        &self.columns[index]
    }

    pub fn column_mut(&mut self, index: ColIdx) -> &mut Column {
        &mut self.columns[index]
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .map(|(column, value)| column.cost * value)
            .sum()
    }

    /// Row activities `A x` for the given column values.
    pub fn row_activities(&self, values: &[f64]) -> Vec<f64> {
        let mut activities = vec![0.0; self.rows.len()];
        for (column, value) in self.columns.iter().zip(values) {
            for &(row, coefficient) in &column.coefficients {
                activities[row.get()] += coefficient * value;
            }
        }
        activities
    }
}
