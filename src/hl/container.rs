use std::convert::TryInto;

use ndarray::{Array, Array1, Array2, ArrayD, ArrayView, ArrayView1};

use crate::hl::config::PlanConfig;
use crate::hl::dataset::Dataset;
use crate::hl::datatype::{as_bytes, check_element, from_bytes, Element};
use crate::hl::exec::Executor;
use crate::hl::plan::{plan, Plan};
use crate::hl::selection::{RawSelection, Selection};
use crate::internal_prelude::*;

fn bind<S>(ds: &Dataset, selection: S) -> Result<RawSelection>
where
    S: TryInto<Selection>,
    Error: From<S::Error>,
{
    let selection: Selection = selection.try_into()?;
    selection.into_raw(ds.shape())
}

#[derive(Debug)]
pub struct Reader<'a> {
    ds: &'a Dataset,
    config: PlanConfig,
}

impl<'a> Reader<'a> {
    /// Creates a reader with the default planning options.
    pub fn new(ds: &'a Dataset) -> Self {
        Self { ds, config: PlanConfig::default() }
    }

    /// Set planning and execution options.
    pub fn config(mut self, config: PlanConfig) -> Self {
        self.config = config;
        self
    }

    /// Plans a read of `selection` without executing it.
    pub fn plan<S>(&self, selection: S) -> Result<Plan>
    where
        S: TryInto<Selection>,
        Error: From<S::Error>,
    {
        plan(&bind(self.ds, selection)?, self.ds.layout(), &self.config)
    }

    fn read_into_buf(&self, sel: &RawSelection, out: &mut [u8]) -> Result<()> {
        let plan = plan(sel, self.ds.layout(), &self.config)?;
        Executor::new(self.ds.store(), self.ds.id(), sel, self.ds.dtype().size(), &self.config)
            .read(&plan, out)
    }

    fn check_out_shape<D: Dimension>(sel: &RawSelection, out_shape: D) -> Result<()> {
        let (out_shape, sel_shape) = (out_shape.dims(), sel.out_shape());
        ensure!(
            out_shape == sel_shape,
            Error::InvalidSelection(format!(
                "output shape {:?} != selection shape {:?}",
                out_shape, sel_shape
            ))
        );
        Ok(())
    }

    /// Reads `selection` into a caller buffer of shape `out_shape`.
    ///
    /// The buffer is row-major; along every axis elements follow the order in
    /// which the selection lists them. Nothing is read unless both the selection
    /// and the buffer are valid.
    pub fn read_into<S, D>(&self, selection: S, out_shape: D, out: &mut [u8]) -> Result<()>
    where
        S: TryInto<Selection>,
        Error: From<S::Error>,
        D: Dimension,
    {
        let sel = bind(self.ds, selection)?;
        Self::check_out_shape(&sel, out_shape)?;
        self.read_into_buf(&sel, out)
    }

    /// Like `read_into`, allocating the buffer.
    pub fn read_selection<S, D>(&self, selection: S, out_shape: D) -> Result<Vec<u8>>
    where
        S: TryInto<Selection>,
        Error: From<S::Error>,
        D: Dimension,
    {
        let sel = bind(self.ds, selection)?;
        Self::check_out_shape(&sel, out_shape)?;
        let mut out = vec![0; sel.size() * self.ds.dtype().size()];
        self.read_into_buf(&sel, &mut out)?;
        Ok(out)
    }

    /// Reads a slice of an n-dimensional array.
    /// If the dimensionality `D` has a fixed number of dimensions, it must match the dimensionality of
    /// the slice, which is the same as the dataset's since every selection keeps all axes.
    pub fn read_slice<T, S, D>(&self, selection: S) -> Result<Array<T, D>>
    where
        T: Element,
        S: TryInto<Selection>,
        Error: From<S::Error>,
        D: ndarray::Dimension,
    {
        check_element::<T>(self.ds.dtype())?;
        let sel = bind(self.ds, selection)?;
        let out_shape = sel.out_shape();
        if let Some(ndim) = D::NDIM {
            let out_ndim = out_shape.len();
            ensure!(
                ndim == out_ndim,
                Error::InvalidSelection(format!(
                    "selection ndim ({}) != array ndim ({})",
                    out_ndim, ndim
                ))
            );
        }
        let mut buf = vec![0; sel.size() * self.ds.dtype().size()];
        self.read_into_buf(&sel, &mut buf)?;
        let arr = ArrayD::from_shape_vec(out_shape, from_bytes(&buf)?)?;
        Ok(arr.into_dimensionality()?)
    }

    /// Reads the whole dataset into an n-dimensional array.
    pub fn read<T: Element, D: ndarray::Dimension>(&self) -> Result<Array<T, D>> {
        self.read_slice(Selection::All)
    }

    /// Reads the whole dataset into a vector in row-major order.
    pub fn read_raw<T: Element>(&self) -> Result<Vec<T>> {
        check_element::<T>(self.ds.dtype())?;
        let sel = bind(self.ds, Selection::All)?;
        let mut buf = vec![0; sel.size() * self.ds.dtype().size()];
        self.read_into_buf(&sel, &mut buf)?;
        from_bytes(&buf)
    }

    pub fn read_1d<T: Element>(&self) -> Result<Array1<T>> {
        self.read()
    }

    pub fn read_2d<T: Element>(&self) -> Result<Array2<T>> {
        self.read()
    }

    pub fn read_dyn<T: Element>(&self) -> Result<ArrayD<T>> {
        self.read()
    }
}

#[derive(Debug)]
pub struct Writer<'a> {
    ds: &'a Dataset,
    config: PlanConfig,
}

impl<'a> Writer<'a> {
    /// Creates a writer with the default planning options.
    pub fn new(ds: &'a Dataset) -> Self {
        Self { ds, config: PlanConfig::default() }
    }

    /// Set planning and execution options.
    pub fn config(mut self, config: PlanConfig) -> Self {
        self.config = config;
        self
    }

    fn write_from_buf(&self, sel: &RawSelection, data: &[u8]) -> Result<()> {
        let plan = plan(sel, self.ds.layout(), &self.config)?;
        Executor::new(self.ds.store(), self.ds.id(), sel, self.ds.dtype().size(), &self.config)
            .write(&plan, data)
    }

    /// Writes a row-major buffer laid out like the output of `Reader::read_into`.
    pub fn write_selection<S>(&self, selection: S, data: &[u8]) -> Result<()>
    where
        S: TryInto<Selection>,
        Error: From<S::Error>,
    {
        let sel = bind(self.ds, selection)?;
        self.write_from_buf(&sel, data)
    }

    /// Writes all data from the array `arr` into the given `selection` of the dataset.
    /// The shape of `arr` must match the shape of the selection.
    pub fn write_slice<'b, A, T, S, D>(&self, arr: A, selection: S) -> Result<()>
    where
        A: Into<ArrayView<'b, T, D>>,
        T: Element,
        S: TryInto<Selection>,
        Error: From<S::Error>,
        D: ndarray::Dimension,
    {
        check_element::<T>(self.ds.dtype())?;
        let sel = bind(self.ds, selection)?;
        let out_shape = sel.out_shape();
        let view = arr.into();
        if let Some(ndim) = D::NDIM {
            let out_ndim = out_shape.len();
            ensure!(
                ndim == out_ndim,
                Error::InvalidSelection(format!(
                    "selection ndim ({}) != array ndim ({})",
                    out_ndim, ndim
                ))
            );
        }
        ensure!(
            view.shape() == out_shape.as_slice(),
            Error::InvalidSelection(format!(
                "shape mismatch: memory ({:?}) != destination ({:?})",
                view.shape(),
                out_shape
            ))
        );
        // strided or transposed views are copied into row-major order first
        let data = view.as_standard_layout();
        match data.as_slice() {
            Some(data) => self.write_from_buf(&sel, as_bytes(data)),
            None => fail!("input array is not in standard layout or non-contiguous"),
        }
    }

    /// Writes an n-dimensional array view into the whole dataset.
    pub fn write<'b, A, T, D>(&self, arr: A) -> Result<()>
    where
        A: Into<ArrayView<'b, T, D>>,
        T: Element,
        D: ndarray::Dimension,
    {
        self.write_slice(arr, Selection::All)
    }

    /// Writes a flat view into the whole dataset in row-major order.
    pub fn write_raw<'b, A, T>(&self, arr: A) -> Result<()>
    where
        A: Into<ArrayView1<'b, T>>,
        T: Element,
    {
        check_element::<T>(self.ds.dtype())?;
        let view = arr.into();
        ensure!(
            view.len() == self.ds.size(),
            Error::InvalidSelection(format!(
                "length mismatch: memory ({}) != destination ({})",
                view.len(),
                self.ds.size()
            ))
        );
        let data = view.as_standard_layout();
        match data.as_slice() {
            Some(data) => self.write_from_buf(&bind(self.ds, Selection::All)?, as_bytes(data)),
            None => fail!("input array is not contiguous"),
        }
    }
}
