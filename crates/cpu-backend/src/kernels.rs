// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CPU kernels for the supported operators.
//!
//! Every kernel writes into a pre-allocated output slice. Shapes were fixed
//! at compile time, so kernels do no validation of their own.

/// Maps flat output indices to flat indices of a broadcast operand.
#[derive(Debug, Clone)]
pub(crate) struct Broadcast {
    out_dims: Vec<usize>,
    strides: Vec<usize>,
    contiguous: bool,
}

impl Broadcast {
    /// `src` must broadcast to `out` (right-aligned, each dim equal or 1).
    pub(crate) fn new(src: &[usize], out: &[usize]) -> Self {
        let rank = out.len();
        let offset = rank.saturating_sub(src.len());
        let mut strides = vec![0; rank];
        let mut step = 1;
        for (i, &d) in src.iter().enumerate().rev() {
            if d != 1 {
                strides[offset + i] = step;
            }
            step *= d;
        }
        Self {
            out_dims: out.to_vec(),
            strides,
            contiguous: src == out,
        }
    }

    #[inline]
    pub(crate) fn source_index(&self, mut flat: usize) -> usize {
        if self.contiguous {
            return flat;
        }
        let mut idx = 0;
        for axis in (0..self.out_dims.len()).rev() {
            let d = self.out_dims[axis];
            idx += (flat % d) * self.strides[axis];
            flat /= d;
        }
        idx
    }
}

/// Dimensions and attributes of a `Gemm`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GemmParams {
    pub m: usize,
    pub k: usize,
    pub n: usize,
    pub trans_a: bool,
    pub trans_b: bool,
    pub alpha: f32,
    pub beta: f32,
}

/// A configured operator ready to execute.
#[derive(Debug, Clone)]
pub(crate) enum Kernel {
    Gemm {
        params: GemmParams,
        bias: Option<Broadcast>,
        relu: bool,
    },
    MatMul {
        m: usize,
        k: usize,
        n: usize,
        relu: bool,
    },
    Add {
        lhs: Broadcast,
        rhs: Broadcast,
        relu: bool,
    },
    Relu,
    LeakyRelu {
        alpha: f32,
    },
    Sigmoid,
    Tanh,
    Softmax {
        outer: usize,
        axis_len: usize,
        inner: usize,
    },
    /// `Flatten` and `Identity`: the data is unchanged.
    Copy,
}

impl Kernel {
    /// Short label for tracing.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Gemm { relu: true, .. } => "gemm+relu",
            Self::Gemm { .. } => "gemm",
            Self::MatMul { relu: true, .. } => "matmul+relu",
            Self::MatMul { .. } => "matmul",
            Self::Add { relu: true, .. } => "add+relu",
            Self::Add { .. } => "add",
            Self::Relu => "relu",
            Self::LeakyRelu { .. } => "leaky_relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softmax { .. } => "softmax",
            Self::Copy => "copy",
        }
    }

    pub(crate) fn execute(&self, inputs: &[&[f32]], out: &mut [f32]) {
        match self {
            Self::Gemm { params, bias, relu } => {
                let c = inputs.get(2).copied().zip(bias.as_ref());
                gemm(inputs[0], inputs[1], c, out, params);
                if *relu {
                    relu_in_place(out);
                }
            }
            Self::MatMul { m, k, n, relu } => {
                matmul(inputs[0], inputs[1], out, *m, *k, *n);
                if *relu {
                    relu_in_place(out);
                }
            }
            Self::Add { lhs, rhs, relu } => {
                for (i, o) in out.iter_mut().enumerate() {
                    *o = inputs[0][lhs.source_index(i)] + inputs[1][rhs.source_index(i)];
                }
                if *relu {
                    relu_in_place(out);
                }
            }
            Self::Relu => map(inputs[0], out, |x| x.max(0.0)),
            Self::LeakyRelu { alpha } => {
                let alpha = *alpha;
                map(inputs[0], out, |x| if x < 0.0 { alpha * x } else { x })
            }
            Self::Sigmoid => map(inputs[0], out, |x| 1.0 / (1.0 + (-x).exp())),
            Self::Tanh => map(inputs[0], out, f32::tanh),
            Self::Softmax {
                outer,
                axis_len,
                inner,
            } => softmax(inputs[0], out, *outer, *axis_len, *inner),
            Self::Copy => out.copy_from_slice(inputs[0]),
        }
    }
}

fn map(src: &[f32], dst: &mut [f32], f: impl Fn(f32) -> f32) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = f(s);
    }
}

fn relu_in_place(buf: &mut [f32]) {
    for x in buf.iter_mut() {
        if *x < 0.0 {
            *x = 0.0;
        }
    }
}

/// `out[M, N] = lhs[M, K] @ rhs[K, N]`, ikj loop order.
fn matmul(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    c.iter_mut().for_each(|x| *x = 0.0);

    // The inner loop is a saxpy on a row of C, sequential in memory.
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (cj, &bj) in c_row.iter_mut().zip(b_row) {
                *cj += a_ip * bj;
            }
        }
    }
}

/// `out = alpha * A' @ B' + beta * C`.
fn gemm(
    a: &[f32],
    b: &[f32],
    c: Option<(&[f32], &Broadcast)>,
    out: &mut [f32],
    p: &GemmParams,
) {
    let (m, k, n) = (p.m, p.k, p.n);
    if !p.trans_a && !p.trans_b {
        matmul(a, b, out, m, k, n);
    } else {
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0f32;
                for q in 0..k {
                    let a_iq = if p.trans_a { a[q * m + i] } else { a[i * k + q] };
                    let b_qj = if p.trans_b { b[j * k + q] } else { b[q * n + j] };
                    acc += a_iq * b_qj;
                }
                out[i * n + j] = acc;
            }
        }
    }

    if p.alpha != 1.0 {
        out.iter_mut().for_each(|x| *x *= p.alpha);
    }
    if let Some((c, bcast)) = c {
        for (idx, o) in out.iter_mut().enumerate() {
            *o += p.beta * c[bcast.source_index(idx)];
        }
    }
}

/// Numerically stable softmax over the middle axis of `[outer, axis_len, inner]`.
fn softmax(src: &[f32], dst: &mut [f32], outer: usize, axis_len: usize, inner: usize) {
    if axis_len == 0 {
        return;
    }
    for o in 0..outer {
        for i in 0..inner {
            let at = |a: usize| (o * axis_len + a) * inner + i;

            let max_val = (0..axis_len)
                .map(|a| src[at(a)])
                .fold(f32::NEG_INFINITY, f32::max);

            let mut sum = 0.0f32;
            for a in 0..axis_len {
                let e = (src[at(a)] - max_val).exp();
                dst[at(a)] = e;
                sum += e;
            }

            if sum > 0.0 {
                let inv_sum = 1.0 / sum;
                for a in 0..axis_len {
                    dst[at(a)] *= inv_sum;
                }
            }
        }
    }
}
