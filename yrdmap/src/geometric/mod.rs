pub mod boundary;
pub mod city;
pub mod score_scale;
