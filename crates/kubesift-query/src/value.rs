//! JSON values as seen by queries
//!
//! [`QueryValue`] wraps [`jaq_json::Val`] so that indexing `null` yields
//! `null`, the way jq does: `.metadata.labels.app` on an object without
//! labels is `null`, not an error. Everything else defers to `Val`.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};
use std::rc::Rc;

use jaq_core::box_iter::box_once;
use jaq_core::path::Opt;
use jaq_core::val::Range;
use jaq_core::{Exn, Native, RunPtr, ValR, ValT, ValX, ValXs};
use jaq_json::Val;
use jaq_std::{Filter, ValT as StdValT, run, unary, v};

type Error = jaq_core::Error<QueryValue>;

const ITERABLE: &str = "iterable (array or object)";

/// A JSON value flowing through a compiled query
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueryValue(Val);

impl QueryValue {
    pub fn as_val(&self) -> &Val {
        &self.0
    }

    fn length(&self) -> ValR<Self> {
        let len = match &self.0 {
            Val::Null => Val::Int(0),
            Val::Bool(_) => return Err(Error::str(format_args!("{self} has no length"))),
            Val::Int(i) => Val::Int(i.abs()),
            Val::Float(f) => Val::Float(f.abs()),
            Val::Num(n) => n.parse::<f64>().map_or(Val::Null, |f| Val::Float(f.abs())),
            Val::Str(s) => Val::Int(s.chars().count() as isize),
            Val::Arr(a) => Val::Int(a.len() as isize),
            Val::Obj(o) => Val::Int(o.len() as isize),
        };
        Ok(Self(len))
    }

    fn keys_unsorted(&self) -> ValR<Self> {
        match &self.0 {
            Val::Arr(a) => Ok((0..a.len()).map(|i| Self(Val::Int(i as isize))).collect()),
            Val::Obj(o) => Ok(o.keys().map(|k| Self(Val::Str(Rc::clone(k)))).collect()),
            _ => Err(Error::typ(self.clone(), ITERABLE)),
        }
    }

    fn has(&self, key: &Self) -> Result<bool, Error> {
        match (&self.0, &key.0) {
            (Val::Arr(a), Val::Int(i)) => Ok(*i >= 0 && (*i as usize) < a.len()),
            (Val::Obj(o), Val::Str(k)) => Ok(o.contains_key(k)),
            _ => Err(Error::index(self.clone(), key.clone())),
        }
    }

    fn contains(&self, other: &Self) -> bool {
        contains(&self.0, &other.0)
    }

    fn indices(&self, needle: &Self) -> ValR<Self> {
        let found: Vec<usize> = match (&self.0, &needle.0) {
            (Val::Null, _) => return Ok(Self(Val::Null)),
            (Val::Str(haystack), Val::Str(s)) if !s.is_empty() => {
                let haystack: Vec<char> = haystack.chars().collect();
                let s: Vec<char> = s.chars().collect();
                windows(&haystack, &s)
            }
            (Val::Arr(haystack), Val::Arr(items)) if !items.is_empty() => {
                windows(haystack, items)
            }
            (Val::Str(_), Val::Str(_)) | (Val::Arr(_), Val::Arr(_)) => Vec::new(),
            (Val::Arr(haystack), item) => haystack
                .iter()
                .enumerate()
                .filter(|(_, x)| *x == item)
                .map(|(i, _)| i)
                .collect(),
            _ => return Err(Error::index(self.clone(), needle.clone())),
        };
        Ok(found.into_iter().map(|i| Self(Val::Int(i as isize))).collect())
    }

    /// Every `(path, value)` pair below this value, parents before children
    fn path_values(&self) -> Vec<(Self, Self)> {
        let mut out = Vec::new();
        collect_paths(&self.0, &mut Vec::new(), &mut out);
        out
    }

    fn from_json(&self) -> ValR<Self> {
        let text = ValT::as_str(&self.0).ok_or_else(|| Error::typ(self.clone(), "string"))?;
        serde_json::from_str::<serde_json::Value>(text)
            .map(Self::from)
            .map_err(|e| Error::str(format_args!("cannot parse {text} as JSON: {e}")))
    }
}

fn contains(l: &Val, r: &Val) -> bool {
    match (l, r) {
        (Val::Str(l), Val::Str(r)) => l.contains(r.as_str()),
        (Val::Arr(l), Val::Arr(r)) => r.iter().all(|r| l.iter().any(|l| contains(l, r))),
        (Val::Obj(l), Val::Obj(r)) => r
            .iter()
            .all(|(k, r)| l.get(k).is_some_and(|l| contains(l, r))),
        _ => l == r,
    }
}

/// Start positions of every (possibly overlapping) occurrence of `needle`
fn windows<T: PartialEq>(haystack: &[T], needle: &[T]) -> Vec<usize> {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, w)| *w == needle)
        .map(|(i, _)| i)
        .collect()
}

fn children(value: &Val) -> Vec<(Val, &Val)> {
    match value {
        Val::Arr(a) => a
            .iter()
            .enumerate()
            .map(|(i, x)| (Val::Int(i as isize), x))
            .collect(),
        Val::Obj(o) => o.iter().map(|(k, x)| (Val::Str(Rc::clone(k)), x)).collect(),
        _ => Vec::new(),
    }
}

fn collect_paths(value: &Val, path: &mut Vec<Val>, out: &mut Vec<(QueryValue, QueryValue)>) {
    for (key, child) in children(value) {
        path.push(key);
        let p = path.iter().cloned().map(QueryValue).collect();
        out.push((p, QueryValue(child.clone())));
        collect_paths(child, path, out);
        path.pop();
    }
}

/// Absolute position of a possibly negative index, if it is in bounds
fn abs_index(i: isize, len: usize) -> Option<usize> {
    let i = if i < 0 {
        len.checked_sub(i.unsigned_abs())?
    } else {
        i as usize
    };
    (i < len).then_some(i)
}

fn lift(r: jaq_json::ValR) -> ValR<QueryValue> {
    r.map(QueryValue).map_err(lift_err)
}

fn lift_err(e: jaq_json::Error) -> Error {
    Error::new(QueryValue(e.into_val()))
}

// ============================================================================
// jaq value traits
// ============================================================================

impl ValT for QueryValue {
    fn from_num(n: &str) -> ValR<Self> {
        lift(<Val as ValT>::from_num(n))
    }

    fn from_map<I: IntoIterator<Item = (Self, Self)>>(iter: I) -> ValR<Self> {
        lift(<Val as ValT>::from_map(
            iter.into_iter().map(|(k, v)| (k.0, v.0)),
        ))
    }

    fn values(self) -> Box<dyn Iterator<Item = ValR<Self>>> {
        Box::new(ValT::values(self.0).map(lift))
    }

    fn index(self, index: &Self) -> ValR<Self> {
        let key = matches!(index.0, Val::Str(_) | Val::Int(_) | Val::Float(_) | Val::Num(_));
        if key && matches!(self.0, Val::Null) {
            return Ok(self);
        }
        lift(ValT::index(self.0, &index.0))
    }

    fn range(self, range: Range<&Self>) -> ValR<Self> {
        if let Val::Null = self.0 {
            return Ok(self);
        }
        let range = range.start.map(|v| &v.0)..range.end.map(|v| &v.0);
        lift(ValT::range(self.0, range))
    }

    fn map_values<'a, I: Iterator<Item = ValX<'a, Self>>>(
        self,
        opt: Opt,
        f: impl Fn(Self) -> I,
    ) -> ValX<'a, Self> {
        match self.0 {
            Val::Arr(a) => {
                let items = Rc::unwrap_or_clone(a).into_iter().map(Self).flat_map(f);
                items.collect()
            }
            Val::Obj(o) => {
                let fields = Rc::unwrap_or_clone(o)
                    .into_iter()
                    .filter_map(|(k, v)| f(Self(v)).next().map(|v| Ok((k, v?.0))));
                let fields = fields.collect::<Result<Vec<_>, Exn<'a, Self>>>()?;
                Ok(Self(Val::obj(fields.into_iter().collect())))
            }
            other => opt.fail(Self(other), |v| Exn::from(Error::typ(v, ITERABLE))),
        }
    }

    fn map_index<'a, I: Iterator<Item = ValX<'a, Self>>>(
        self,
        index: &Self,
        opt: Opt,
        f: impl Fn(Self) -> I,
    ) -> ValX<'a, Self> {
        match (self.0, &index.0) {
            (Val::Obj(mut o), Val::Str(key)) => {
                let fields = Rc::make_mut(&mut o);
                let old = fields.get(key).cloned().unwrap_or_default();
                match f(Self(old)).next().transpose()? {
                    Some(new) => {
                        fields.insert(Rc::clone(key), new.0);
                    }
                    None => {
                        fields.swap_remove(key);
                    }
                }
                Ok(Self(Val::Obj(o)))
            }
            // `null | .a = 1` builds the object
            (Val::Null, Val::Str(key)) => match f(Self(Val::Null)).next().transpose()? {
                Some(new) => Ok(Self(Val::obj([(Rc::clone(key), new.0)].into_iter().collect()))),
                None => Ok(Self(Val::Null)),
            },
            (Val::Arr(mut a), Val::Int(i)) => {
                let Some(pos) = abs_index(*i, a.len()) else {
                    let err = Error::str(format_args!("index {i} out of bounds"));
                    return opt.fail(Self(Val::Arr(a)), |_| Exn::from(err));
                };
                let items = Rc::make_mut(&mut a);
                let old = std::mem::take(&mut items[pos]);
                match f(Self(old)).next().transpose()? {
                    Some(new) => items[pos] = new.0,
                    None => {
                        items.remove(pos);
                    }
                }
                Ok(Self(Val::Arr(a)))
            }
            (other, _) => opt.fail(Self(other), |v| Exn::from(Error::index(v, index.clone()))),
        }
    }

    fn map_range<'a, I: Iterator<Item = ValX<'a, Self>>>(
        self,
        range: Range<&Self>,
        opt: Opt,
        f: impl Fn(Self) -> I,
    ) -> ValX<'a, Self> {
        let mut a = match self.0 {
            Val::Arr(a) => a,
            other => return opt.fail(Self(other), |v| Exn::from(Error::typ(v, "array"))),
        };

        let bound = |b: Option<&Self>| -> Result<Option<isize>, Error> {
            b.map(|v| StdValT::as_isize(&v.0).ok_or_else(|| Error::typ(v.clone(), "integer")))
                .transpose()
        };
        let (from, upto) = (bound(range.start)?, bound(range.end)?);

        let len = a.len();
        let clip = |b: Option<isize>, default: usize| {
            b.map_or(default, |i| {
                if i < 0 {
                    len.saturating_sub(i.unsigned_abs())
                } else {
                    (i as usize).min(len)
                }
            })
        };
        let from = clip(from, 0);
        let upto = clip(upto, len).max(from);

        let items = Rc::make_mut(&mut a);
        let slice: Self = items[from..upto].iter().cloned().map(Self).collect();
        let replacement = match f(slice).next().transpose()? {
            Some(Self(Val::Arr(new))) => Rc::unwrap_or_clone(new),
            Some(other) => return Err(Exn::from(Error::typ(other, "array"))),
            None => Vec::new(),
        };
        items.splice(from..upto, replacement);
        Ok(Self(Val::Arr(a)))
    }

    fn as_bool(&self) -> bool {
        ValT::as_bool(&self.0)
    }

    fn as_str(&self) -> Option<&str> {
        ValT::as_str(&self.0)
    }
}

impl StdValT for QueryValue {
    fn into_seq<S: FromIterator<Self>>(self) -> Result<S, Self> {
        match self.0 {
            Val::Arr(a) => Ok(Rc::unwrap_or_clone(a).into_iter().map(Self).collect()),
            other => Err(Self(other)),
        }
    }

    fn as_isize(&self) -> Option<isize> {
        StdValT::as_isize(&self.0)
    }

    fn as_f64(&self) -> Result<f64, Error> {
        StdValT::as_f64(&self.0).map_err(lift_err)
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<serde_json::Value> for QueryValue {
    fn from(value: serde_json::Value) -> Self {
        Self(Val::from(value))
    }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        Self(Val::from(b))
    }
}

impl From<isize> for QueryValue {
    fn from(i: isize) -> Self {
        Self(Val::from(i))
    }
}

impl From<f64> for QueryValue {
    fn from(f: f64) -> Self {
        Self(Val::from(f))
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        Self(Val::from(s))
    }
}

impl FromIterator<Self> for QueryValue {
    fn from_iter<T: IntoIterator<Item = Self>>(iter: T) -> Self {
        Self(iter.into_iter().map(|v| v.0).collect())
    }
}

macro_rules! binary_op {
    ($trait:ident, $method:ident) => {
        impl $trait for QueryValue {
            type Output = ValR<Self>;
            fn $method(self, rhs: Self) -> Self::Output {
                lift($trait::$method(self.0, rhs.0))
            }
        }
    };
}

binary_op!(Add, add);
binary_op!(Sub, sub);
binary_op!(Mul, mul);
binary_op!(Div, div);
binary_op!(Rem, rem);

impl Neg for QueryValue {
    type Output = ValR<Self>;
    fn neg(self) -> Self::Output {
        lift(-self.0)
    }
}

// ============================================================================
// JSON builtins
// ============================================================================

fn once<'a>(r: ValR<QueryValue>) -> ValXs<'a, QueryValue> {
    box_once(r.map_err(Exn::from))
}

/// Native filters over JSON values (`length`, `keys_unsorted`, `has`, ...)
/// that the definitions in `jaq_json::defs` build on
pub fn funs() -> impl Iterator<Item = Filter<Native<QueryValue>>> {
    natives().into_vec().into_iter().map(run)
}

fn natives() -> Box<[Filter<RunPtr<QueryValue>>]> {
    Box::new([
        ("tojson", v(0), |_, cv| once(Ok(cv.1.to_string().into()))),
        ("fromjson", v(0), |_, cv| once(cv.1.from_json())),
        ("length", v(0), |_, cv| once(cv.1.length())),
        ("keys_unsorted", v(0), |_, cv| once(cv.1.keys_unsorted())),
        ("has", v(1), |_, cv| {
            unary(cv, |v, k| v.has(&k).map(QueryValue::from))
        }),
        ("contains", v(1), |_, cv| {
            unary(cv, |x, y| Ok(QueryValue::from(x.contains(&y))))
        }),
        ("indices", v(1), |_, cv| unary(cv, |x, y| x.indices(&y))),
        ("path_values", v(0), |_, cv| {
            let pairs = cv.1.path_values().into_iter();
            Box::new(pairs.map(|(p, v)| Ok([p, v].into_iter().collect())))
        }),
        ("paths", v(0), |_, cv| {
            Box::new(cv.1.path_values().into_iter().map(|(p, _)| Ok(p)))
        }),
    ])
}
