use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A cell in a classroom grid. Ordering is row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Seat {
    pub row: i64,
    pub column: i64,
}

impl Seat {
    pub fn new(row: i64, column: i64) -> Self {
        Self { row, column }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("grid must have at least one row and one column (got {rows}x{columns})")]
    InvalidDimensions { rows: i64, columns: i64 },

    #[error("seat ({row}, {column}) is outside the {rows}x{columns} grid")]
    OutOfBounds {
        row: i64,
        column: i64,
        rows: i64,
        columns: i64,
    },

    #[error("seat ({row}, {column}) is occupied by {student_id}")]
    Occupied {
        row: i64,
        column: i64,
        student_id: String,
    },

    #[error("student {student_id} already sits at ({row}, {column})")]
    AlreadySeated {
        student_id: String,
        row: i64,
        column: i64,
    },
}

/// In-memory view of one seating plan.
///
/// The two maps are kept in lockstep so that every student holds at most one
/// seat and every seat holds at most one student.
#[derive(Debug, Clone)]
pub struct SeatingGrid {
    rows: i64,
    columns: i64,
    by_seat: BTreeMap<Seat, String>,
    by_student: HashMap<String, Seat>,
}

impl SeatingGrid {
    pub fn new(rows: i64, columns: i64) -> Result<Self, GridError> {
        if rows < 1 || columns < 1 {
            return Err(GridError::InvalidDimensions { rows, columns });
        }
        Ok(Self {
            rows,
            columns,
            by_seat: BTreeMap::new(),
            by_student: HashMap::new(),
        })
    }

    pub fn rows(&self) -> i64 {
        self.rows
    }

    pub fn columns(&self) -> i64 {
        self.columns
    }

    pub fn occupied_count(&self) -> usize {
        self.by_seat.len()
    }

    pub fn contains(&self, seat: Seat) -> bool {
        (0..self.rows).contains(&seat.row) && (0..self.columns).contains(&seat.column)
    }

    fn check_bounds(&self, seat: Seat) -> Result<(), GridError> {
        if self.contains(seat) {
            Ok(())
        } else {
            Err(GridError::OutOfBounds {
                row: seat.row,
                column: seat.column,
                rows: self.rows,
                columns: self.columns,
            })
        }
    }

    pub fn seat_of(&self, student_id: &str) -> Option<Seat> {
        self.by_student.get(student_id).copied()
    }

    pub fn occupant(&self, seat: Seat) -> Option<&str> {
        self.by_seat.get(&seat).map(String::as_str)
    }

    /// Seats a student who does not hold a seat yet.
    pub fn place(&mut self, student_id: &str, seat: Seat) -> Result<(), GridError> {
        self.check_bounds(seat)?;
        if let Some(current) = self.seat_of(student_id) {
            return Err(GridError::AlreadySeated {
                student_id: student_id.to_string(),
                row: current.row,
                column: current.column,
            });
        }
        if let Some(other) = self.occupant(seat) {
            return Err(GridError::Occupied {
                row: seat.row,
                column: seat.column,
                student_id: other.to_string(),
            });
        }
        self.by_seat.insert(seat, student_id.to_string());
        self.by_student.insert(student_id.to_string(), seat);
        Ok(())
    }

    /// Seats a student at `seat`, releasing any seat they held before.
    ///
    /// All checks run before anything changes, so a failed move leaves the
    /// student exactly where they were. Returns the previous seat, if any.
    pub fn move_to(&mut self, student_id: &str, seat: Seat) -> Result<Option<Seat>, GridError> {
        self.check_bounds(seat)?;
        if let Some(other) = self.occupant(seat) {
            if other != student_id {
                return Err(GridError::Occupied {
                    row: seat.row,
                    column: seat.column,
                    student_id: other.to_string(),
                });
            }
        }
        let previous = self.by_student.insert(student_id.to_string(), seat);
        if let Some(prev) = previous {
            self.by_seat.remove(&prev);
        }
        self.by_seat.insert(seat, student_id.to_string());
        Ok(previous)
    }

    /// Clears the student's seat. `None` means they were not seated.
    pub fn remove(&mut self, student_id: &str) -> Option<Seat> {
        let seat = self.by_student.remove(student_id)?;
        self.by_seat.remove(&seat);
        Some(seat)
    }

    /// Occupied seats in row-major order.
    pub fn occupants(&self) -> impl Iterator<Item = (Seat, &str)> + '_ {
        self.by_seat.iter().map(|(s, id)| (*s, id.as_str()))
    }

    /// Empty seats in row-major order.
    pub fn unoccupied_cells(&self) -> Vec<Seat> {
        let mut out = Vec::new();
        for row in 0..self.rows {
            for column in 0..self.columns {
                let seat = Seat::new(row, column);
                if !self.by_seat.contains_key(&seat) {
                    out.push(seat);
                }
            }
        }
        out
    }

    /// Seats students into the empty cells row by row, left to right.
    /// Returns the students that did not fit.
    pub fn fill_row_major<I>(&mut self, students: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut free = self.unoccupied_cells().into_iter();
        let mut leftover = Vec::new();
        for student_id in students {
            if self.by_student.contains_key(&student_id) {
                continue;
            }
            match free.next() {
                Some(seat) => {
                    self.by_seat.insert(seat, student_id.clone());
                    self.by_student.insert(student_id, seat);
                }
                None => leftover.push(student_id),
            }
        }
        leftover
    }
}
