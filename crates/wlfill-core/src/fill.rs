//! Null-filling helpers for grid columns.

/// Fill `None` slots with the last observed value (forward fill / LOCF).
pub fn fill_forward<T: Clone>(values: &[Option<T>]) -> Vec<Option<T>> {
    let mut result = Vec::with_capacity(values.len());
    let mut last_value: Option<T> = None;

    for v in values {
        match v {
            Some(x) => {
                last_value = Some(x.clone());
                result.push(Some(x.clone()));
            }
            None => {
                result.push(last_value.clone());
            }
        }
    }

    result
}

/// Fill `None` slots with the next observed value (backward fill / NOCB).
pub fn fill_backward<T: Clone>(values: &[Option<T>]) -> Vec<Option<T>> {
    let mut result = vec![None; values.len()];
    let mut next_value: Option<T> = None;

    for (i, v) in values.iter().enumerate().rev() {
        match v {
            Some(x) => {
                next_value = Some(x.clone());
                result[i] = Some(x.clone());
            }
            None => {
                result[i] = next_value.clone();
            }
        }
    }

    result
}

/// Forward fill followed by backward fill, so every slot is labelled as long
/// as one value is present.
pub fn fill_both<T: Clone>(values: &[Option<T>]) -> Vec<Option<T>> {
    fill_backward(&fill_forward(values))
}

/// Fill `None` slots by linear interpolation between known neighbours.
///
/// Leading and trailing gaps take the nearest known value. Returns `None`
/// when the column has no known value at all.
pub fn fill_interpolate(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().position(|v| v.is_some())?;
    let last = values.iter().rposition(|v| v.is_some())?;

    let mut result: Vec<f64> = vec![f64::NAN; values.len()];

    let first_val = values[first]?;
    let last_val = values[last]?;
    for item in result.iter_mut().take(first) {
        *item = first_val;
    }
    for item in result.iter_mut().skip(last + 1) {
        *item = last_val;
    }

    let mut prev_idx = first;
    let mut prev_val = first_val;
    result[first] = prev_val;

    for i in (first + 1)..=last {
        if let Some(v) = values[i] {
            let gap = i - prev_idx;
            if gap > 1 {
                let slope = (v - prev_val) / gap as f64;
                for j in 1..gap {
                    result[prev_idx + j] = prev_val + slope * j as f64;
                }
            }
            result[i] = v;
            prev_idx = i;
            prev_val = v;
        }
    }

    Some(result)
}
