//! Expression evaluation against a memory implementation.
//!
//! Grounded on `expression.cpp`'s `PerformBinaryOperationOn` (the
//! arithmetic/comparison/boolean op table) and `IExpression`'s
//! `GetIntegerValue`/`SetIntegerValue`/`GetStringValue` virtual methods,
//! which this collapses into free functions over the tagged
//! [`Expression`] tree plus a [`MemoryAccess`] trait the machine's memory
//! implements.

use rlvm_types::{Error, Result};

use super::ast::{is_assignment, Expression};

/// What an expression evaluator needs from memory: indexed int/string
/// cells plus the single store register. Kept as a trait, rather than a
/// concrete `Memory` dependency, so the expression layer does not need
/// to know the memory bank layout.
pub trait MemoryAccess {
    fn read_int(&self, type_tag: u8, location: i32) -> Result<i32>;
    fn write_int(&mut self, type_tag: u8, location: i32, value: i32) -> Result<()>;
    fn read_str(&self, type_tag: u8, location: i32) -> Result<String>;
    fn write_str(&mut self, type_tag: u8, location: i32, value: String) -> Result<()>;
    fn store_register(&self) -> i32;
    fn set_store_register(&mut self, value: i32);
}

/// Evaluate `expr` as an integer, matching `IExpression::GetIntegerValue`.
/// Assignment operators (`0x14..=0x24`) perform their write as a side
/// effect and yield the assigned value, as the original's fast-path and
/// general-case evaluation both do.
pub fn eval_int(expr: &Expression, mem: &mut dyn MemoryAccess) -> Result<i32> {
    match expr {
        Expression::StoreRegister => Ok(mem.store_register()),
        Expression::IntConstant(v) => Ok(*v),
        Expression::StringConstant(_) => Err(Error::TypeMismatch(
            "GetIntegerValue invalid on a string constant".into(),
        )),
        Expression::MemoryReference { type_tag, location } => {
            let loc = eval_int(location, mem)?;
            mem.read_int(*type_tag, loc)
        }
        Expression::Unary { op, operand } => {
            let v = eval_int(operand, mem)?;
            match op {
                0x01 => Ok(v.wrapping_neg()),
                other => Err(Error::BadFormat(format!("unknown unary operator 0x{other:02x}"))),
            }
        }
        Expression::Binary { op, lhs, rhs } => {
            if is_assignment(*op) {
                eval_assignment(*op, lhs, rhs, mem)
            } else {
                let l = eval_int(lhs, mem)?;
                let r = eval_int(rhs, mem)?;
                perform_binary_op(*op, l, r)
            }
        }
        Expression::Complex(_) | Expression::Special { .. } => Err(Error::TypeMismatch(
            "GetIntegerValue invalid on a compound expression".into(),
        )),
    }
}

/// Evaluate `expr` as a string, matching `IExpression::GetStringValue`.
pub fn eval_str(expr: &Expression, mem: &mut dyn MemoryAccess) -> Result<String> {
    match expr {
        Expression::StringConstant(s) => Ok(s.clone()),
        Expression::MemoryReference { type_tag, location } => {
            let loc = eval_int(location, mem)?;
            mem.read_str(*type_tag, loc)
        }
        _ => Err(Error::TypeMismatch(
            "GetStringValue invalid on this expression".into(),
        )),
    }
}

fn eval_assignment(
    op: u8,
    lhs: &Expression,
    rhs: &Expression,
    mem: &mut dyn MemoryAccess,
) -> Result<i32> {
    let rhs_val = eval_int(rhs, mem)?;
    let new_value = if op == 0x1e {
        rhs_val
    } else if (0x14..=0x1d).contains(&op) {
        let current = eval_int(lhs, mem)?;
        perform_binary_op(op - 0x14, current, rhs_val)?
    } else {
        return Err(Error::BadFormat(format!(
            "undefined assignment operator 0x{op:02x}"
        )));
    };
    assign_int(lhs, new_value, mem)?;
    Ok(new_value)
}

fn assign_int(lhs: &Expression, value: i32, mem: &mut dyn MemoryAccess) -> Result<()> {
    match lhs {
        Expression::StoreRegister => {
            mem.set_store_register(value);
            Ok(())
        }
        Expression::MemoryReference { type_tag, location } => {
            let loc = eval_int(location, mem)?;
            mem.write_int(*type_tag, loc, value)
        }
        _ => Err(Error::TypeMismatch(
            "assignment target is not addressable".into(),
        )),
    }
}

/// The arithmetic/comparison/boolean operator table, matching
/// `PerformBinaryOperationOn` exactly: integer division and modulo by
/// zero return the dividend unchanged rather than erroring.
pub fn perform_binary_op(op: u8, lhs: i32, rhs: i32) -> Result<i32> {
    match op {
        0x00 | 0x14 => Ok(lhs.wrapping_add(rhs)),
        0x01 | 0x15 => Ok(lhs.wrapping_sub(rhs)),
        0x02 | 0x16 => Ok(lhs.wrapping_mul(rhs)),
        0x03 | 0x17 => Ok(if rhs != 0 { lhs.wrapping_div(rhs) } else { lhs }),
        0x04 | 0x18 => Ok(if rhs != 0 { lhs.wrapping_rem(rhs) } else { lhs }),
        0x05 | 0x19 => Ok(lhs & rhs),
        0x06 | 0x1a => Ok(lhs | rhs),
        0x07 | 0x1b => Ok(lhs ^ rhs),
        0x08 | 0x1c => Ok(lhs.wrapping_shl(rhs as u32)),
        0x09 | 0x1d => Ok(lhs.wrapping_shr(rhs as u32)),
        0x28 => Ok((lhs == rhs) as i32),
        0x29 => Ok((lhs != rhs) as i32),
        0x2a => Ok((lhs <= rhs) as i32),
        0x2b => Ok((lhs < rhs) as i32),
        0x2c => Ok((lhs >= rhs) as i32),
        0x2d => Ok((lhs > rhs) as i32),
        0x3c => Ok(((lhs != 0) && (rhs != 0)) as i32),
        0x3d => Ok(((lhs != 0) || (rhs != 0)) as i32),
        other => Err(Error::BadFormat(format!(
            "invalid operator 0x{other:02x} in expression"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeMemory {
        ints: HashMap<(u8, i32), i32>,
        strs: HashMap<(u8, i32), String>,
        store_reg: i32,
    }

    impl MemoryAccess for FakeMemory {
        fn read_int(&self, type_tag: u8, location: i32) -> Result<i32> {
            Ok(*self.ints.get(&(type_tag, location)).unwrap_or(&0))
        }
        fn write_int(&mut self, type_tag: u8, location: i32, value: i32) -> Result<()> {
            self.ints.insert((type_tag, location), value);
            Ok(())
        }
        fn read_str(&self, type_tag: u8, location: i32) -> Result<String> {
            Ok(self.strs.get(&(type_tag, location)).cloned().unwrap_or_default())
        }
        fn write_str(&mut self, type_tag: u8, location: i32, value: String) -> Result<()> {
            self.strs.insert((type_tag, location), value);
            Ok(())
        }
        fn store_register(&self) -> i32 {
            self.store_reg
        }
        fn set_store_register(&mut self, value: i32) {
            self.store_reg = value;
        }
    }

    #[test]
    fn division_by_zero_returns_dividend() {
        assert_eq!(perform_binary_op(0x03, 7, 0).unwrap(), 7);
    }

    #[test]
    fn modulo_by_zero_returns_dividend() {
        assert_eq!(perform_binary_op(0x04, 9, 0).unwrap(), 9);
    }

    #[test]
    fn plain_assign_writes_through_and_returns_value() {
        let mut mem = FakeMemory::default();
        let lhs = Expression::MemoryReference {
            type_tag: 0,
            location: Box::new(Expression::IntConstant(3)),
        };
        let rhs = Expression::IntConstant(42);
        let expr = Expression::Binary {
            op: 0x1e,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        assert_eq!(eval_int(&expr, &mut mem).unwrap(), 42);
        assert_eq!(mem.read_int(0, 3).unwrap(), 42);
    }

    #[test]
    fn add_assign_combines_with_current_value() {
        let mut mem = FakeMemory::default();
        mem.write_int(0, 1, 10).unwrap();
        let lhs = Expression::MemoryReference {
            type_tag: 0,
            location: Box::new(Expression::IntConstant(1)),
        };
        let expr = Expression::Binary {
            op: 0x14,
            lhs: Box::new(lhs),
            rhs: Box::new(Expression::IntConstant(5)),
        };
        assert_eq!(eval_int(&expr, &mut mem).unwrap(), 15);
        assert_eq!(mem.read_int(0, 1).unwrap(), 15);
    }

    #[test]
    fn store_register_round_trips_through_assignment() {
        let mut mem = FakeMemory::default();
        let expr = Expression::Binary {
            op: 0x1e,
            lhs: Box::new(Expression::StoreRegister),
            rhs: Box::new(Expression::IntConstant(7)),
        };
        eval_int(&expr, &mut mem).unwrap();
        assert_eq!(mem.store_register(), 7);
    }

    #[test]
    fn string_constant_evaluates_directly() {
        let mut mem = FakeMemory::default();
        let expr = Expression::StringConstant("hello".to_string());
        assert_eq!(eval_str(&expr, &mut mem).unwrap(), "hello");
    }

    #[test]
    fn getintegervalue_on_string_constant_is_a_type_mismatch() {
        let mut mem = FakeMemory::default();
        let expr = Expression::StringConstant("x".to_string());
        assert!(matches!(eval_int(&expr, &mut mem), Err(Error::TypeMismatch(_))));
    }
}
