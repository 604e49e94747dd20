//! Utilities.
use anyhow::{anyhow, Context, Result};
use candle_core::{backprop::GradStore, DType, Tensor, Var};
use candle_nn::VarMap;
use log::trace;
use std::{fs::File, path::Path};

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> usize;

    /// Sets the output dimension.
    fn set_out_dim(&mut self, v: usize);
}

/// Returns the variables of a [`VarMap`] with their names, sorted by name.
pub fn named_vars(varmap: &VarMap) -> Result<Vec<(String, Var)>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("VarMap lock is poisoned"))?;
    let mut vars: Vec<_> = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vars)
}

/// Copies the values of the variables of `src` into the variables of `dest`.
///
/// Variables are identified by their names. The copy is a deep one: `dest`
/// does not share storage with `src` afterwards.
pub fn copy_varmap(dest: &VarMap, src: &VarMap) -> Result<()> {
    let src = named_vars(src)?;
    let dest = dest
        .data()
        .lock()
        .map_err(|_| anyhow!("VarMap lock is poisoned"))?;
    if src.len() != dest.len() {
        return Err(anyhow!(
            "VarMaps differ in size: {} and {}",
            src.len(),
            dest.len()
        ));
    }

    for (name, v_src) in src.iter() {
        trace!("copy {}", name);
        let v_dest = dest
            .get(name)
            .with_context(|| format!("Variable {} is missing in the destination", name))?;
        v_dest.set(&v_src.as_tensor().copy()?)?;
    }

    Ok(())
}

/// Clamps every gradient component of `vars` to `[-limit, limit]`.
pub fn clamp_grads(grads: &mut GradStore, vars: &[Var], limit: f64) -> Result<()> {
    for var in vars {
        let clamped = match grads.get(var.as_tensor()) {
            Some(g) => g.clamp(-limit, limit)?,
            None => continue,
        };
        grads.insert(var.as_tensor(), clamped);
    }
    Ok(())
}

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor, candle_core::Error> {
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?;
    let m2 = (1.0 - &m1)?;
    (((0.5 * m1)? * d.powf(2.0))? + m2 * (d - 0.5))?.mean_all()
}

/// Flushes a file written by a library call to disk.
pub fn sync_file(path: impl AsRef<Path>) -> Result<()> {
    File::open(path.as_ref())
        .and_then(|f| f.sync_all())
        .with_context(|| format!("Failed to sync {:?}", path.as_ref()))
}
