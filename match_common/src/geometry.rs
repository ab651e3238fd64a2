//! Pose primitives.
//!
//! Two algebras are provided on [Pose]:
//!
//! * The `+` / `-` operators form the *motion delta* algebra. Positions are added and subtracted
//!   component wise in the frame both poses share, orientations compose by quaternion
//!   multiplication and `target - current` carries the rotation `q_target ⊗ conj(q_current)`.
//!   Under these operators `(a - b) + b == a` and `a - a == Pose::identity()`.
//! * [Pose::compose] and [Pose::relative_to] are rigid frame chaining, where the child's position
//!   is rotated by the parent's orientation. `b.compose(&a.relative_to(&b)) == a`.
//!
//! Every orientation produced by an operation is renormalized so repeated composition does not drift.

use std::ops::{Add, Mul, Neg, Sub};

use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Below this norm a quaternion carries no usable rotation and normalizes to identity.
const DEGENERATE_NORM: f64 = 1e-12;

/// A point (or difference vector) in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn norm(&self) -> f64 {
        self.to_vector().norm()
    }

    pub fn to_vector(&self) -> na::Vector3<f64> {
        na::Vector3::new(self.x, self.y, self.z)
    }

    pub fn approx_eq(&self, other: &Point3, tolerance: f64) -> bool {
        (*self - *other).norm() <= tolerance
    }
}

impl From<na::Vector3<f64>> for Point3 {
    fn from(v: na::Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<[f64; 3]> for Point3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl Add for Point3 {
    type Output = Point3;

    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;

    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Point3 {
    type Output = Point3;

    fn neg(self) -> Point3 {
        Point3::new(-self.x, -self.y, -self.z)
    }
}

/// A rotation stored as a quaternion `(w, x, y, z)`.
///
/// The value is expected to be of unit length. Constructors do not enforce this, but every
/// operation that produces a new orientation returns a normalized one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Orientation {
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw` radians about the z axis.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw / 2.0;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Rotation of `angle` radians about `axis`. A zero axis yields the identity.
    pub fn from_axis_angle(axis: Point3, angle: f64) -> Self {
        match na::Unit::try_new(axis.to_vector(), DEGENERATE_NORM) {
            Some(axis) => na::UnitQuaternion::from_axis_angle(&axis, angle).into(),
            None => Self::identity(),
        }
    }

    pub fn norm(&self) -> f64 {
        self.to_quaternion().norm()
    }

    /// The inverse rotation, for unit quaternions.
    pub fn conjugate(&self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Scales the quaternion back to unit length. A degenerate quaternion becomes the identity.
    pub fn normalized(&self) -> Self {
        let norm = self.norm();
        if norm < DEGENERATE_NORM || !norm.is_finite() {
            return Self::identity();
        }
        Self::new(self.w / norm, self.x / norm, self.y / norm, self.z / norm)
    }

    /// The rotation taking `current` onto `self`: `self ⊗ conj(current)`.
    pub fn difference(&self, current: &Orientation) -> Self {
        *self * current.conjugate()
    }

    /// Rotates a vector by this orientation.
    pub fn rotate(&self, point: &Point3) -> Point3 {
        self.to_unit_quaternion()
            .transform_vector(&point.to_vector())
            .into()
    }

    /// Re-expresses this rotation in a frame rotated by `frame`: `frame ⊗ self ⊗ conj(frame)`.
    pub fn expressed_in(&self, frame: &Orientation) -> Self {
        *frame * *self * frame.conjugate()
    }

    /// Compares rotations, treating `q` and `-q` as the same rotation.
    pub fn approx_eq(&self, other: &Orientation, tolerance: f64) -> bool {
        let a = self.normalized().to_quaternion();
        let b = other.normalized().to_quaternion();
        (a - b).norm().min((a + b).norm()) <= tolerance
    }

    pub fn to_quaternion(&self) -> na::Quaternion<f64> {
        na::Quaternion::new(self.w, self.x, self.y, self.z)
    }

    pub fn to_unit_quaternion(&self) -> na::UnitQuaternion<f64> {
        let q = self.normalized();
        na::UnitQuaternion::new_unchecked(q.to_quaternion())
    }
}

impl From<na::Quaternion<f64>> for Orientation {
    fn from(q: na::Quaternion<f64>) -> Self {
        Self::new(q.w, q.i, q.j, q.k)
    }
}

impl From<na::UnitQuaternion<f64>> for Orientation {
    fn from(q: na::UnitQuaternion<f64>) -> Self {
        q.into_inner().into()
    }
}

/// Quaternion product, composing `rhs` first and `self` second. The result is renormalized.
impl Mul for Orientation {
    type Output = Orientation;

    fn mul(self, rhs: Orientation) -> Orientation {
        Orientation::from(self.to_quaternion() * rhs.to_quaternion()).normalized()
    }
}

/// A position together with an orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point3,
    pub orientation: Orientation,
}

impl Pose {
    pub const fn new(position: Point3, orientation: Orientation) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Zero translation, identity rotation.
    pub const fn identity() -> Self {
        Self::new(Point3::zero(), Orientation::identity())
    }

    pub const fn from_position(position: Point3) -> Self {
        Self::new(position, Orientation::identity())
    }

    /// A pose on the ground plane at `(x, y)` facing `yaw` radians.
    pub fn planar(x: f64, y: f64, yaw: f64) -> Self {
        Self::new(Point3::new(x, y, 0.0), Orientation::from_yaw(yaw))
    }

    /// Frame chaining: `child` is expressed in this pose's frame, the result is in this pose's parent frame.
    pub fn compose(&self, child: &Pose) -> Pose {
        Pose::new(
            self.position + self.orientation.rotate(&child.position),
            self.orientation * child.orientation,
        )
    }

    /// This pose expressed in the frame of `reference`.
    pub fn relative_to(&self, reference: &Pose) -> Pose {
        let inverse = reference.orientation.conjugate();
        Pose::new(
            inverse.rotate(&(self.position - reference.position)),
            inverse * self.orientation,
        )
    }

    /// The rigid transform undoing this pose.
    pub fn inverse(&self) -> Pose {
        let inverse = self.orientation.conjugate().normalized();
        Pose::new(inverse.rotate(&-self.position), inverse)
    }

    pub fn approx_eq(&self, other: &Pose, tolerance: f64) -> bool {
        self.position.approx_eq(&other.position, tolerance)
            && self.orientation.approx_eq(&other.orientation, tolerance)
    }
}

/// Applies a motion delta: translations add, rotations compose with `self` applied last.
impl Add for Pose {
    type Output = Pose;

    fn add(self, rhs: Pose) -> Pose {
        Pose::new(
            self.position + rhs.position,
            self.orientation * rhs.orientation,
        )
    }
}

/// The motion delta taking `rhs` onto `self`, in the frame both are expressed in.
impl Sub for Pose {
    type Output = Pose;

    fn sub(self, rhs: Pose) -> Pose {
        Pose::new(
            self.position - rhs.position,
            self.orientation.difference(&rhs.orientation),
        )
    }
}

/// Applies `rhs` as a motion delta to this pose, i.e. `*self = rhs + *self`.
impl std::ops::AddAssign for Pose {
    fn add_assign(&mut self, rhs: Pose) {
        *self = rhs + *self;
    }
}
