//! Raw unit commands: allocate, reserve, release and status.

use anyhow::Result;
use rangekeeper_core::{Store, UnitRange};

/// Allocate `count` units and print them, primary first.
pub fn allocate(store: &Store, count: u32) -> Result<()> {
    let allocation = store.transact(|txn| txn.allocate(count))?;

    println!("Primary: {}", allocation.primary);
    if allocation.spares.is_empty() {
        println!("Spares: none");
    } else {
        println!("Spares: {}", join(&allocation.spares));
    }
    Ok(())
}

/// Reserve every range, or none of them.
pub fn reserve(store: &Store, ranges: &[UnitRange]) -> Result<()> {
    store.transact(|txn| txn.reserve(ranges))?;
    println!("Reserved {}", join(ranges));
    Ok(())
}

/// Release every range, or none of them.
pub fn release(store: &Store, ranges: &[UnitRange]) -> Result<()> {
    store.transact(|txn| txn.release(ranges))?;
    println!("Released {}", join(ranges));
    Ok(())
}

/// Print the reserved ranges and the number of free units.
pub fn status(store: &Store) -> Result<()> {
    let (universe, ranges, reserved, free) = store.read(|txn| {
        let space = txn.reserved();
        Ok((
            space.universe(),
            space.ranges().to_vec(),
            space.reserved_units(),
            space.free_units(),
        ))
    })?;

    println!("Universe: {universe}");
    if ranges.is_empty() {
        println!("Reserved: none");
    } else {
        println!("Reserved: {}", join(&ranges));
    }
    println!("Reserved units: {reserved}");
    println!("Free units: {free}");
    Ok(())
}

fn join(ranges: &[UnitRange]) -> String {
    ranges
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_space_separated() {
        let ranges = [UnitRange::single(7), UnitRange::new(9, 12).unwrap()];
        assert_eq!(join(&ranges), "7-7 9-12");
        assert_eq!(join(&[]), "");
    }
}
