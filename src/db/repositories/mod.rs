mod anchors;
mod production;
