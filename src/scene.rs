//! Initial particle layouts. A preset maps to one or more lattice regions; regions are
//! concatenated, and unused capacity is padded with sentinel particles.

use bincode::{Decode, Encode};
use lin_alg::f32::Vec3;
use log::warn;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    error::ConfigError,
    geometry::{self, Shape3D},
};

/// Position of a slot that doesn't take part in the simulation. At infinity, so renderers
/// cull it and every kernel evaluates to 0 against it.
pub const SENTINEL_POSIT: [f32; 4] = [f32::INFINITY, f32::INFINITY, f32::INFINITY, 0.];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Scene {
    Bath,
    Drop,
    DoubleDrop,
}

impl Scene {
    pub const ALL: [Self; 3] = [Self::Bath, Self::Drop, Self::DoubleDrop];

    pub fn name(self) -> &'static str {
        match self {
            Self::Bath => "Funny bath",
            Self::Drop => "Drop",
            Self::DoubleDrop => "Double drop",
        }
    }

    /// Display names, in `ALL` order.
    pub fn names() -> [&'static str; 3] {
        Self::ALL.map(Self::name)
    }

    pub fn from_index(i: usize) -> Self {
        match Self::ALL.get(i) {
            Some(s) => *s,
            None => {
                warn!("Unknown scene index {i}; falling back to {}", Self::ALL[0].name());
                Self::ALL[0]
            }
        }
    }

    pub fn from_name(name: &str) -> Self {
        match Self::ALL.iter().find(|s| s.name().eq_ignore_ascii_case(name)) {
            Some(s) => *s,
            None => {
                warn!("Unknown scene `{name}`; falling back to {}", Self::ALL[0].name());
                Self::ALL[0]
            }
        }
    }

    /// Lattice regions for a box of side `box_size`, centred on the origin.
    pub fn regions(self, box_size: f32) -> Vec<SceneRegion> {
        let l = box_size;

        match self {
            Self::Bath => vec![SceneRegion {
                shape: Shape3D::Box,
                res: [64, 64, 32],
                start: Vec3::new(-l / 2., -l / 2., -l / 2.),
                end: Vec3::new(l / 2., 0., 0.),
            }],
            Self::Drop => vec![SceneRegion {
                shape: Shape3D::Box,
                res: [16, 16, 16],
                start: Vec3::new(-l / 10., 2. * l / 10., -l / 10.),
                end: Vec3::new(l / 10., 4. * l / 10., l / 10.),
            }],
            Self::DoubleDrop => vec![
                SceneRegion {
                    shape: Shape3D::Sphere,
                    res: [16, 16, 16],
                    start: Vec3::new(-3. * l / 10., l / 10., -l / 10.),
                    end: Vec3::new(-l / 10., 3. * l / 10., l / 10.),
                },
                SceneRegion {
                    shape: Shape3D::Sphere,
                    res: [16, 16, 16],
                    start: Vec3::new(l / 10., 2. * l / 10., -l / 10.),
                    end: Vec3::new(3. * l / 10., 4. * l / 10., l / 10.),
                },
            ],
        }
    }

    /// Active particle count. Independent of box size.
    pub fn nb_particles(self) -> usize {
        self.regions(1.).iter().map(|r| r.nb_particles()).sum()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SceneRegion {
    pub shape: Shape3D,
    pub res: [u32; 3],
    pub start: Vec3,
    pub end: Vec3,
}

impl SceneRegion {
    pub fn nb_particles(&self) -> usize {
        geometry::lattice_len(self.res)
    }

    pub fn lattice(&self) -> Vec<Vec3> {
        geometry::lattice(self.shape, self.res, self.start, self.end)
    }
}

/// Write the regions' lattice points into the start of `posits`, and sentinels into the
/// rest. Each point is offset by up to `jitter` per axis (seeded), then clamped to
/// `[-half_box, half_box]`. Returns the number of active particles.
pub fn fill_particles(
    regions: &[SceneRegion],
    posits: &mut [[f32; 4]],
    jitter: f32,
    half_box: f32,
    seed: u64,
) -> Result<usize, ConfigError> {
    let requested: usize = regions.iter().map(|r| r.nb_particles()).sum();
    if requested > posits.len() {
        return Err(ConfigError::CapacityExceeded {
            requested,
            capacity: posits.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut offset = || {
        if jitter > 0. {
            rng.random_range(-jitter..jitter)
        } else {
            0.
        }
    };

    let mut i = 0;
    for region in regions {
        for p in region.lattice() {
            posits[i] = [
                (p.x + offset()).clamp(-half_box, half_box),
                (p.y + offset()).clamp(-half_box, half_box),
                (p.z + offset()).clamp(-half_box, half_box),
                1.,
            ];
            i += 1;
        }
    }

    for p in &mut posits[i..] {
        *p = SENTINEL_POSIT;
    }

    Ok(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_counts() {
        assert_eq!(Scene::Bath.nb_particles(), 131_072);
        assert_eq!(Scene::Drop.nb_particles(), 4_096);
        assert_eq!(Scene::DoubleDrop.nb_particles(), 8_192);
    }

    #[test]
    fn names_and_fallback() {
        assert_eq!(Scene::names(), ["Funny bath", "Drop", "Double drop"]);
        assert_eq!(Scene::from_index(2), Scene::DoubleDrop);
        assert_eq!(Scene::from_index(17), Scene::Bath);
        assert_eq!(Scene::from_name("double drop"), Scene::DoubleDrop);
        assert_eq!(Scene::from_name("Tsunami"), Scene::Bath);
    }

    #[test]
    fn presets_fit_in_box() {
        for scene in Scene::ALL {
            let mut posits = vec![[0.; 4]; scene.nb_particles()];
            let n = fill_particles(&scene.regions(10.), &mut posits, 0., 5., 0).unwrap();
            assert_eq!(n, scene.nb_particles());

            for p in &posits {
                for v in &p[..3] {
                    assert!(v.abs() <= 5.);
                }
            }
        }
    }

    #[test]
    fn pads_with_sentinels() {
        let regions = Scene::Drop.regions(10.);
        let mut posits = vec![[0.; 4]; 5_000];
        let n = fill_particles(&regions, &mut posits, 0.05, 5., 3).unwrap();

        assert_eq!(n, 4_096);
        assert!(posits[..n].iter().all(|p| p.iter().all(|v| v.is_finite())));
        assert!(posits[n..].iter().all(|p| *p == SENTINEL_POSIT));

        let n = fill_particles(&[], &mut posits, 0., 5., 0).unwrap();
        assert_eq!(n, 0);
        assert!(posits.iter().all(|p| p[0].is_infinite()));
    }

    #[test]
    fn rejects_overfull_scene() {
        let mut posits = vec![[0.; 4]; 100];
        assert_eq!(
            fill_particles(&Scene::Drop.regions(10.), &mut posits, 0., 5., 0),
            Err(ConfigError::CapacityExceeded {
                requested: 4_096,
                capacity: 100
            })
        );
    }
}
