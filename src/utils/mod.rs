use nalgebra::DMatrix;
use std::collections::BTreeMap;

pub mod validation;

/// Sparse vector keyed by dimension index. Absent dimensions are zero.
pub type SparseVector = BTreeMap<usize, f64>;

pub fn sparse_cosine_similarity(a: &SparseVector, b: &SparseVector) -> f64 {
    // Iterate the shorter vector, look up in the longer one.
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot_product: f64 = small
        .iter()
        .filter_map(|(idx, x)| large.get(idx).map(|y| x * y))
        .sum();

    let norm_a = sparse_norm(a);
    let norm_b = sparse_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

pub fn sparse_norm(vector: &SparseVector) -> f64 {
    vector.values().map(|x| x * x).sum::<f64>().sqrt()
}

pub fn normalize_sparse(vector: &mut SparseVector) {
    let norm = sparse_norm(vector);
    if norm > 0.0 {
        for x in vector.values_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between rows `a` and `b` of a dense matrix.
pub fn row_cosine_similarity(matrix: &DMatrix<f64>, a: usize, b: usize) -> f64 {
    let row_a = matrix.row(a);
    let row_b = matrix.row(b);
    let norm_a = row_a.norm();
    let norm_b = row_b.norm();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        row_a.dot(&row_b) / (norm_a * norm_b)
    }
}
