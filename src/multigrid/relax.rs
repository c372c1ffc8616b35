//! Relaxation of the interface equations at one level.
//!
//! Every block updates its end values from its intercepts and the neighbours' coupled
//! unknowns: `(f, l) = slopes · (x_L, x_R) + rhs`. The three smoothers differ only in which
//! neighbour values they see.

use num_complex::Complex64;

use super::guard::Ends;
use super::level::Level;
use crate::config::RelaxationKind;
use crate::error::TriError;
use crate::parallel::{tags, Comm};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

fn firsts(soln: &[Ends]) -> Vec<Complex64> {
    soln.iter().map(|e| e.first).collect()
}

fn lasts(soln: &[Ends]) -> Vec<Complex64> {
    soln.iter().map(|e| e.last).collect()
}

fn check_len(values: Vec<Complex64>, nmode: usize, from: usize) -> Result<Vec<Complex64>, TriError> {
    if values.len() != nmode {
        return Err(TriError::Topology(format!(
            "rank {from} sent {} halo values for {nmode} modes",
            values.len()
        )));
    }
    Ok(values)
}

/// Neighbour values `(x_L, x_R)` per mode at this level; zero where no neighbour exists.
///
/// Even blocks send before receiving and odd blocks receive before sending, so the
/// exchange completes even when sends block until matched.
pub fn exchange_halos<C: Comm>(comm: &C, level: &Level) -> Result<Vec<(Complex64, Complex64)>, TriError> {
    let topo = level.topo;
    let nmode = level.nmode();
    let (lower, upper) = (topo.lower_rank(), topo.upper_rank());
    let to_left = tags::at_level(tags::HALO_TO_LEFT, topo.level);
    let to_right = tags::at_level(tags::HALO_TO_RIGHT, topo.level);

    let send = |comm: &C| -> Result<(), TriError> {
        if let Some(r) = lower {
            comm.send(r, to_left, &firsts(&level.soln))?;
        }
        if let Some(r) = upper {
            comm.send(r, to_right, &lasts(&level.soln))?;
        }
        Ok(())
    };
    let receive = |comm: &C| -> Result<(Vec<Complex64>, Vec<Complex64>), TriError> {
        let from_lower = match lower {
            Some(r) => check_len(comm.recv(r, to_right)?, nmode, r)?,
            None => vec![ZERO; nmode],
        };
        let from_upper = match upper {
            Some(r) => check_len(comm.recv(r, to_left)?, nmode, r)?,
            None => vec![ZERO; nmode],
        };
        Ok((from_lower, from_upper))
    };

    let (xl, xr) = if topo.is_even() {
        send(comm)?;
        receive(comm)?
    } else {
        let got = receive(comm)?;
        send(comm)?;
        got
    };
    Ok(xl.into_iter().zip(xr).collect())
}

/// Run `sweeps` relaxation sweeps of the given kind. Inactive ranks return immediately.
pub fn relax<C: Comm>(comm: &C, level: &mut Level, kind: RelaxationKind, sweeps: usize) -> Result<(), TriError> {
    if !level.topo.is_active() {
        return Ok(());
    }
    for _ in 0..sweeps {
        match kind {
            RelaxationKind::Jacobi => jacobi_sweep(comm, level)?,
            RelaxationKind::GaussSeidel => gauss_seidel_sweep(comm, level)?,
            RelaxationKind::RedBlack => red_black_sweep(comm, level)?,
        }
    }
    Ok(())
}

fn update(level: &mut Level, halos: &[(Complex64, Complex64)]) {
    for (m, &(xl, xr)) in halos.iter().enumerate() {
        level.soln[m] = level.slopes[m].apply(level.rhs[m], xl, xr);
    }
}

/// Both neighbours from the previous iterate.
pub fn jacobi_sweep<C: Comm>(comm: &C, level: &mut Level) -> Result<(), TriError> {
    let halos = exchange_halos(comm, level)?;
    update(level, &halos);
    Ok(())
}

/// Left-to-right pipelined sweep: the left neighbour's new last value, the right
/// neighbour's old first value.
pub fn gauss_seidel_sweep<C: Comm>(comm: &C, level: &mut Level) -> Result<(), TriError> {
    let topo = level.topo;
    let nmode = level.nmode();
    let (lower, upper) = (topo.lower_rank(), topo.upper_rank());
    let to_left = tags::at_level(tags::HALO_TO_LEFT, topo.level);
    let pipeline = tags::at_level(tags::PIPELINE, topo.level);

    if let Some(r) = lower {
        comm.send(r, to_left, &firsts(&level.soln))?;
    }
    let xr = match upper {
        Some(r) => check_len(comm.recv(r, to_left)?, nmode, r)?,
        None => vec![ZERO; nmode],
    };
    let xl = match lower {
        Some(r) => check_len(comm.recv(r, pipeline)?, nmode, r)?,
        None => vec![ZERO; nmode],
    };
    let halos: Vec<_> = xl.into_iter().zip(xr).collect();
    update(level, &halos);
    if let Some(r) = upper {
        comm.send(r, pipeline, &lasts(&level.soln))?;
    }
    Ok(())
}

/// Even blocks update from their odd neighbours, then odd blocks from the new even values.
pub fn red_black_sweep<C: Comm>(comm: &C, level: &mut Level) -> Result<(), TriError> {
    half_sweep(comm, level, true)?;
    half_sweep(comm, level, false)
}

fn half_sweep<C: Comm>(comm: &C, level: &mut Level, red: bool) -> Result<(), TriError> {
    let topo = level.topo;
    let nmode = level.nmode();
    let (lower, upper) = (topo.lower_rank(), topo.upper_rank());
    let to_left = tags::at_level(tags::HALO_TO_LEFT, topo.level);
    let to_right = tags::at_level(tags::HALO_TO_RIGHT, topo.level);

    if topo.is_even() == red {
        let xl = match lower {
            Some(r) => check_len(comm.recv(r, to_right)?, nmode, r)?,
            None => vec![ZERO; nmode],
        };
        let xr = match upper {
            Some(r) => check_len(comm.recv(r, to_left)?, nmode, r)?,
            None => vec![ZERO; nmode],
        };
        let halos: Vec<_> = xl.into_iter().zip(xr).collect();
        update(level, &halos);
    } else {
        if let Some(r) = lower {
            comm.send(r, to_left, &firsts(&level.soln))?;
        }
        if let Some(r) = upper {
            comm.send(r, to_right, &lasts(&level.soln))?;
        }
    }
    Ok(())
}

/// `rhs + slopes · (x_L, x_R) − soln` for every mode, stored in `level.residual`.
pub fn compute_residual<C: Comm>(comm: &C, level: &mut Level) -> Result<(), TriError> {
    if !level.topo.is_active() {
        return Ok(());
    }
    let halos = exchange_halos(comm, level)?;
    for (m, &(xl, xr)) in halos.iter().enumerate() {
        level.residual[m] = level.slopes[m].apply(level.rhs[m], xl, xr) - level.soln[m];
    }
    Ok(())
}
