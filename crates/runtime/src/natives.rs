//! The reference native library (§4.6): the built-ins every program gets
//! registered for free by [`crate::vm::Vm::with_standard_library`].

use crate::native::{NativeFn, NativeRegistry};
use osfl_core::Value;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn install(registry: &mut NativeRegistry) {
    let table: &[(&str, NativeFn)] = &[
        ("print", print),
        ("str", str_),
        ("len", len),
        ("to_upper", to_upper),
        ("to_lower", to_lower),
        ("substring", substring),
        ("split", split),
        ("join", join),
        ("append", append),
        ("type", type_of),
        ("range", range),
        ("int", int),
        ("float", float),
        ("bool", bool_),
        ("abs", abs),
        ("sqrt", sqrt),
        ("pow", pow),
        ("time", time),
        ("exit", exit),
    ];
    for (name, f) in table {
        registry.register(name, *f).expect("standard library fits within the native function cap");
    }
}

fn print(args: &[Value]) -> Result<Value, String> {
    let rendered: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    println!("{}", rendered.join(" "));
    Ok(Value::Null)
}

/// Coerces every argument to its string form and concatenates them, so the
/// compiler can route both plain `str(x)` coercion calls and multi-part
/// string interpolation through this single native.
fn str_(args: &[Value]) -> Result<Value, String> {
    if args.is_empty() {
        return Err("str: expected at least 1 argument".to_string());
    }
    let rendered: String = args.iter().map(|v| v.to_string()).collect();
    Ok(Value::string(rendered))
}

fn len(args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::Int(s.len() as i64)),
        Some(Value::List(l)) => Ok(Value::Int(l.borrow().len() as i64)),
        _ => Err("len: expected a string or list".to_string()),
    }
}

fn to_upper(args: &[Value]) -> Result<Value, String> {
    let s = expect_string(args, "to_upper")?;
    Ok(Value::string(s.to_uppercase()))
}

fn to_lower(args: &[Value]) -> Result<Value, String> {
    let s = expect_string(args, "to_lower")?;
    Ok(Value::string(s.to_lowercase()))
}

fn substring(args: &[Value]) -> Result<Value, String> {
    let s = expect_string(args, "substring")?;
    let start = expect_int(args, 1, "substring")? as usize;
    let end = expect_int(args, 2, "substring")? as usize;
    if start > end || end > s.len() {
        return Err(format!("substring: range {start}..{end} out of bounds for length {}", s.len()));
    }
    Ok(Value::string(s[start..end].to_string()))
}

fn split(args: &[Value]) -> Result<Value, String> {
    let s = expect_string(args, "split")?;
    let sep = expect_string_at(args, 1, "split")?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        s.split(sep.as_str()).map(Value::string).collect()
    };
    Ok(Value::list(parts))
}

fn join(args: &[Value]) -> Result<Value, String> {
    let list = match args.first() {
        Some(Value::List(l)) => l.borrow().clone(),
        _ => return Err("join: expected a list".to_string()),
    };
    let sep = expect_string_at(args, 1, "join")?;
    let rendered: Vec<String> = list.iter().map(|v| v.to_string()).collect();
    Ok(Value::string(rendered.join(&sep)))
}

fn append(args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::List(l)) => {
            let value = args.get(1).cloned().unwrap_or(Value::Null);
            l.borrow_mut().push(value);
            Ok(Value::List(l.clone()))
        }
        _ => Err("append: expected a list".to_string()),
    }
}

fn type_of(args: &[Value]) -> Result<Value, String> {
    let value = args.first().ok_or("type: expected 1 argument")?;
    Ok(Value::string(value.type_name()))
}

fn range(args: &[Value]) -> Result<Value, String> {
    let start = expect_int(args, 0, "range")?;
    let end = expect_int(args, 1, "range")?;
    if start > end {
        return Ok(Value::list(Vec::new()));
    }
    Ok(Value::list((start..end).map(Value::Int).collect()))
}

fn int(args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Float(f)) => Ok(Value::Int(*f as i64)),
        Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| format!("int: cannot parse '{s}'")),
        _ => Err("int: unsupported argument".to_string()),
    }
}

fn float(args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Float(*i as f64)),
        Some(Value::Float(f)) => Ok(Value::Float(*f)),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| format!("float: cannot parse '{s}'")),
        _ => Err("float: unsupported argument".to_string()),
    }
}

fn bool_(args: &[Value]) -> Result<Value, String> {
    let value = args.first().ok_or("bool: expected 1 argument")?;
    Ok(Value::Bool(value.is_truthy()))
}

fn abs(args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Int(i.abs())),
        Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
        _ => Err("abs: expected a number".to_string()),
    }
}

fn sqrt(args: &[Value]) -> Result<Value, String> {
    let x = expect_number(args, 0, "sqrt")?;
    Ok(Value::Float(x.sqrt()))
}

fn pow(args: &[Value]) -> Result<Value, String> {
    let base = expect_number(args, 0, "pow")?;
    let exp = expect_number(args, 1, "pow")?;
    Ok(Value::Float(base.powf(exp)))
}

fn time(_args: &[Value]) -> Result<Value, String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| "time: system clock is before the epoch".to_string())?;
    Ok(Value::Int(now.as_secs() as i64))
}

fn exit(args: &[Value]) -> Result<Value, String> {
    let code = args.first().and_then(Value::as_int).unwrap_or(0);
    std::process::exit(code as i32);
}

fn expect_string(args: &[Value], name: &str) -> Result<String, String> {
    expect_string_at(args, 0, name)
}

fn expect_string_at(args: &[Value], index: usize, name: &str) -> Result<String, String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.to_string()),
        _ => Err(format!("{name}: expected a string argument at position {index}")),
    }
}

fn expect_int(args: &[Value], index: usize, name: &str) -> Result<i64, String> {
    match args.get(index) {
        Some(Value::Int(i)) => Ok(*i),
        _ => Err(format!("{name}: expected an int argument at position {index}")),
    }
}

fn expect_number(args: &[Value], index: usize, name: &str) -> Result<f64, String> {
    match args.get(index) {
        Some(Value::Int(i)) => Ok(*i as f64),
        Some(Value::Float(f)) => Ok(*f),
        _ => Err(format!("{name}: expected a number argument at position {index}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_counts_bytes_and_elements() {
        assert_eq!(len(&[Value::string("hi")]).unwrap(), Value::Int(2));
        assert_eq!(len(&[Value::list(vec![Value::Int(1), Value::Int(2)])]).unwrap(), Value::Int(2));
    }

    #[test]
    fn append_mutates_the_shared_list() {
        let list = Value::list(vec![Value::Int(1)]);
        let result = append(&[list.clone(), Value::Int(2)]).unwrap();
        let Value::List(inner) = result else { panic!("expected list") };
        assert_eq!(inner.borrow().len(), 2);
    }

    #[test]
    fn range_is_half_open() {
        let result = range(&[Value::Int(0), Value::Int(3)]).unwrap();
        let Value::List(inner) = result else { panic!("expected list") };
        assert_eq!(*inner.borrow(), vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn substring_rejects_out_of_bounds() {
        assert!(substring(&[Value::string("hi"), Value::Int(0), Value::Int(10)]).is_err());
    }
}
