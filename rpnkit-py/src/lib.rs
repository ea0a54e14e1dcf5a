//! Python bindings for the rpnkit anchor and proposal library.
//!
//! Boxes cross the boundary as `float32` arrays of shape `[N, 4]` in
//! `(x1, y1, x2, y2)` order.

use std::sync::Arc;

use numpy::ndarray::{Array1, Array2, Array4};
use numpy::{
    IntoPyArray, PyArray1, PyArray2, PyArray4, PyReadonlyArray1, PyReadonlyArray2,
    PyUntypedArrayMethods,
};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use rpnkit::lowlevel::{boxes_from_flat, containment_keep_flags, deltas_from_flat, flatten_boxes};
use rpnkit::{
    AnchorCache as RustAnchorCache, AnchorGenerator as RustAnchorGenerator, AnchorSpec, Bbox,
    BoxCodec as RustBoxCodec, ContainmentFilterConfig, ImageShape, OverlapMatrix, OverlapMetric,
    ProposalConfig, RpnError,
};

/// Convert an RpnError to a Python exception.
fn to_py_err(err: RpnError) -> PyErr {
    match err {
        RpnError::IndexOutOfBounds { .. } => PyRuntimeError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn parse_metric(metric: &str) -> PyResult<OverlapMetric> {
    match metric.to_lowercase().as_str() {
        "iou" => Ok(OverlapMetric::Iou),
        "containment" => Ok(OverlapMetric::Containment),
        _ => Err(PyValueError::new_err(
            "metric must be 'iou' or 'containment'",
        )),
    }
}

/// Reads an `[N, 4]` array into boxes.
fn read_boxes(arr: &PyReadonlyArray2<'_, f32>) -> PyResult<Vec<Bbox>> {
    let shape = arr.shape();
    if shape[1] != 4 {
        return Err(PyValueError::new_err(format!(
            "expected boxes of shape [N, 4], got [{}, {}]",
            shape[0], shape[1]
        )));
    }
    boxes_from_flat(arr.as_slice()?).map_err(to_py_err)
}

fn boxes_to_py<'py>(py: Python<'py>, boxes: &[Bbox]) -> PyResult<Bound<'py, PyArray2<f32>>> {
    let flat = flatten_boxes(boxes);
    let arr = Array2::from_shape_vec((boxes.len(), 4), flat)
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    Ok(arr.into_pyarray(py))
}

fn matrix_to_py<'py>(py: Python<'py>, m: OverlapMatrix) -> PyResult<Bound<'py, PyArray2<f32>>> {
    let arr = Array2::from_shape_vec((m.rows(), m.cols()), m.as_slice().to_vec())
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    Ok(arr.into_pyarray(py))
}

/// Pairwise IoU between `a` ([N, 4]) and `b` ([M, 4]), shape [N, M].
#[pyfunction]
fn pairwise_iou<'py>(
    py: Python<'py>,
    a: PyReadonlyArray2<'py, f32>,
    b: PyReadonlyArray2<'py, f32>,
) -> PyResult<Bound<'py, PyArray2<f32>>> {
    let a = read_boxes(&a)?;
    let b = read_boxes(&b)?;
    matrix_to_py(py, rpnkit::pairwise_iou(&a, &b))
}

/// Fraction of each `a[i]` covered by each `b[j]`, shape [N, M].
#[pyfunction]
fn pairwise_containment<'py>(
    py: Python<'py>,
    a: PyReadonlyArray2<'py, f32>,
    b: PyReadonlyArray2<'py, f32>,
) -> PyResult<Bound<'py, PyArray2<f32>>> {
    let a = read_boxes(&a)?;
    let b = read_boxes(&b)?;
    matrix_to_py(py, rpnkit::pairwise_containment(&a, &b))
}

/// Select proposals with top-k, clipping, min-size filtering and NMS.
///
/// Args:
///     boxes: float32 array [N, 4]
///     scores: float32 array [N]
///     height, width: image extent used for clipping
///     mask: optional bool array [N] restricting candidates
///
/// Returns:
///     (boxes [K, 4], scores [K]) in NMS survivor order
#[pyfunction]
#[pyo3(signature = (
    boxes,
    scores,
    height,
    width,
    pre_nms_topk = 6000,
    post_nms_topk = 1000,
    min_size = 0.0,
    nms_iou = 0.7,
    mask = None
))]
#[allow(clippy::too_many_arguments)]
fn select_proposals<'py>(
    py: Python<'py>,
    boxes: PyReadonlyArray2<'py, f32>,
    scores: PyReadonlyArray1<'py, f32>,
    height: f32,
    width: f32,
    pre_nms_topk: usize,
    post_nms_topk: usize,
    min_size: f32,
    nms_iou: f32,
    mask: Option<PyReadonlyArray1<'py, bool>>,
) -> PyResult<(Bound<'py, PyArray2<f32>>, Bound<'py, PyArray1<f32>>)> {
    let boxes = read_boxes(&boxes)?;
    let scores = scores.as_slice()?;
    let mask = match &mask {
        Some(m) => Some(m.as_slice()?),
        None => None,
    };
    let cfg = ProposalConfig {
        pre_nms_topk,
        post_nms_topk,
        min_size,
        nms_iou,
    };
    let set = rpnkit::select_proposals(&boxes, scores, ImageShape::new(height, width), &cfg, mask)
        .map_err(to_py_err)?;
    let out_boxes = boxes_to_py(py, &set.boxes)?;
    let out_scores = Array1::from_vec(set.scores).into_pyarray(py);
    Ok((out_boxes, out_scores))
}

/// Keep flag per anchor: best overlap against `parents` is `> threshold`.
#[pyfunction]
#[pyo3(signature = (parents, anchors, threshold = 0.3, metric = "containment"))]
fn containment_keep_mask<'py>(
    py: Python<'py>,
    parents: PyReadonlyArray2<'py, f32>,
    anchors: PyReadonlyArray2<'py, f32>,
    threshold: f32,
    metric: &str,
) -> PyResult<Bound<'py, PyArray1<bool>>> {
    let parents = read_boxes(&parents)?;
    let anchors = read_boxes(&anchors)?;
    let cfg = ContainmentFilterConfig {
        threshold,
        metric: parse_metric(metric)?,
        ..ContainmentFilterConfig::default()
    };
    let flags = containment_keep_flags(&parents, &anchors, &cfg).map_err(to_py_err)?;
    Ok(Array1::from_vec(flags).into_pyarray(py))
}

/// Clip boxes to `[0, width] x [0, height]`; returns a new array.
#[pyfunction]
fn clip_boxes<'py>(
    py: Python<'py>,
    boxes: PyReadonlyArray2<'py, f32>,
    height: f32,
    width: f32,
) -> PyResult<Bound<'py, PyArray2<f32>>> {
    let mut boxes = read_boxes(&boxes)?;
    rpnkit::clip_boxes(&mut boxes, ImageShape::new(height, width));
    boxes_to_py(py, &boxes)
}

/// Anchor generator with a private grid cache.
#[pyclass]
pub struct AnchorGenerator {
    inner: RustAnchorGenerator,
}

#[pymethods]
impl AnchorGenerator {
    #[new]
    fn new() -> Self {
        Self {
            inner: RustAnchorGenerator::new(Arc::new(RustAnchorCache::new())),
        }
    }

    /// Anchor grid of shape [field, field, len(sizes) * len(ratios), 4].
    ///
    /// Repeated calls with the same arguments reuse the cached grid.
    fn generate<'py>(
        &self,
        py: Python<'py>,
        stride: u32,
        sizes: Vec<f32>,
        ratios: Vec<f32>,
        max_size: u32,
    ) -> PyResult<Bound<'py, PyArray4<f32>>> {
        let spec = AnchorSpec::new(stride, sizes, ratios, max_size);
        let grid = self.inner.generate(&spec).map_err(to_py_err)?;
        let [fh, fw, a, _] = grid.shape();
        let arr = Array4::from_shape_vec((fh, fw, a, 4), flatten_boxes(grid.as_slice()))
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(arr.into_pyarray(py))
    }

    /// Number of distinct grids held by the cache.
    #[getter]
    fn cache_size(&self) -> usize {
        self.inner.cache().len()
    }

    fn __repr__(&self) -> String {
        format!("AnchorGenerator(cached={})", self.inner.cache().len())
    }
}

/// Box regression encoder/decoder.
#[pyclass]
#[derive(Clone)]
pub struct BoxCodec {
    inner: RustBoxCodec,
}

#[pymethods]
impl BoxCodec {
    /// Args:
    ///     weights: (wx, wy, ww, wh) (default: (1, 1, 1, 1))
    ///     delta_clamp: upper bound on dw/dh before exp (default: ln(1000/16))
    #[new]
    #[pyo3(signature = (weights = [1.0, 1.0, 1.0, 1.0], delta_clamp = rpnkit::lowlevel::DEFAULT_DELTA_CLAMP))]
    fn new(weights: [f32; 4], delta_clamp: f32) -> PyResult<Self> {
        let inner = RustBoxCodec {
            delta_clamp,
            weights,
        };
        inner.validate().map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Encode `targets` against `anchors`, both [N, 4]; returns deltas [N, 4].
    fn encode<'py>(
        &self,
        py: Python<'py>,
        anchors: PyReadonlyArray2<'py, f32>,
        targets: PyReadonlyArray2<'py, f32>,
    ) -> PyResult<Bound<'py, PyArray2<f32>>> {
        let anchors = read_boxes(&anchors)?;
        let targets = read_boxes(&targets)?;
        let deltas = self
            .inner
            .encode_boxes(&anchors, &targets)
            .map_err(to_py_err)?;
        let flat: Vec<f32> = deltas.iter().flat_map(|d| d.to_array()).collect();
        let arr = Array2::from_shape_vec((deltas.len(), 4), flat)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(arr.into_pyarray(py))
    }

    /// Apply deltas [N, 4] to anchors [N, 4]; returns boxes [N, 4].
    fn decode<'py>(
        &self,
        py: Python<'py>,
        anchors: PyReadonlyArray2<'py, f32>,
        deltas: PyReadonlyArray2<'py, f32>,
    ) -> PyResult<Bound<'py, PyArray2<f32>>> {
        let anchors = read_boxes(&anchors)?;
        if deltas.shape()[1] != 4 {
            return Err(PyValueError::new_err("expected deltas of shape [N, 4]"));
        }
        let deltas = deltas_from_flat(deltas.as_slice()?).map_err(to_py_err)?;
        let boxes = self
            .inner
            .decode_boxes(&anchors, &deltas)
            .map_err(to_py_err)?;
        boxes_to_py(py, &boxes)
    }

    fn __repr__(&self) -> String {
        format!(
            "BoxCodec(weights={:?}, delta_clamp={})",
            self.inner.weights, self.inner.delta_clamp
        )
    }
}

/// Python module for rpnkit.
#[pymodule]
fn _rpnkit(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<AnchorGenerator>()?;
    m.add_class::<BoxCodec>()?;
    m.add_function(wrap_pyfunction!(pairwise_iou, m)?)?;
    m.add_function(wrap_pyfunction!(pairwise_containment, m)?)?;
    m.add_function(wrap_pyfunction!(select_proposals, m)?)?;
    m.add_function(wrap_pyfunction!(containment_keep_mask, m)?)?;
    m.add_function(wrap_pyfunction!(clip_boxes, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
