use std::collections::HashSet;

use bit_vec::BitVec;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::errors::CustomError;
use crate::models::board::{Coord, ShipPlacement};

/// Side length of every board.
pub const BOARD_SIZE: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

pub struct ShipClass {
    pub name: &'static str,
    pub size: u8,
    pub orientation: Orientation,
}

/// The fleet the generator lays out.
pub const STANDARD_FLEET: [ShipClass; 5] = [
    ShipClass { name: "patrol-boat", size: 2, orientation: Orientation::Vertical },
    ShipClass { name: "submarine", size: 3, orientation: Orientation::Horizontal },
    ShipClass { name: "destroyer", size: 4, orientation: Orientation::Horizontal },
    ShipClass { name: "battleship", size: 5, orientation: Orientation::Vertical },
    ShipClass { name: "carrier", size: 6, orientation: Orientation::Horizontal },
];

/// Checks a submitted fleet: at least one ship, no empty ship, every cell on
/// the board and no cell claimed twice. Nothing is persisted here.
pub fn validate_fleet(ships: &[ShipPlacement], size: u8) -> Result<(), CustomError> {
    if ships.is_empty() || ships.iter().any(|ship| ship.positions.is_empty()) {
        return Err(CustomError::InvalidInput);
    }

    let mut seen = HashSet::new();
    for coord in ships.iter().flat_map(|ship| ship.positions.iter()) {
        if !seen.insert(*coord) {
            return Err(CustomError::DuplicatePosition);
        }
    }

    if seen.iter().any(|coord| !coord.in_bounds(size)) {
        return Err(CustomError::InvalidInput);
    }
    Ok(())
}

fn cells_of(start: Coord, class: &ShipClass) -> impl Iterator<Item = Coord> + '_ {
    (0..class.size as i32).map(move |i| match class.orientation {
        Orientation::Horizontal => Coord::new(start.x + i, start.y),
        Orientation::Vertical => Coord::new(start.x, start.y + i),
    })
}

/// Lays out the standard fleet at random, without overlaps and inside the
/// board.
pub fn generate_fleet<R: Rng + ?Sized>(rng: &mut R, size: u8) -> Vec<ShipPlacement> {
    let mut occupied = BitVec::from_elem(size as usize * size as usize, false);
    let mut ships = Vec::with_capacity(STANDARD_FLEET.len());

    for class in STANDARD_FLEET.iter() {
        loop {
            let start = Coord::new(rng.gen_range(0..size as i32), rng.gen_range(0..size as i32));
            let fits = cells_of(start, class)
                .all(|c| c.in_bounds(size) && !occupied.get(c.index(size)).unwrap_or(true));
            if !fits {
                continue;
            }

            let positions: Vec<Coord> = cells_of(start, class).collect();
            for c in &positions {
                occupied.set(c.index(size), true);
            }
            ships.push(ShipPlacement { ship_type: class.name.to_string(), positions });
            break;
        }
    }
    ships
}

/// Picks uniformly among the coordinates whose bit in `tried` is unset.
pub fn pick_untried<R: Rng + ?Sized>(tried: &BitVec, size: u8, rng: &mut R) -> Option<Coord> {
    let untried: Vec<usize> = (0..size as usize * size as usize)
        .filter(|i| !tried.get(*i).unwrap_or(false))
        .collect();
    untried.choose(rng).map(|i| Coord::from_index(*i, size))
}
